// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Service layer. Wires the tagprint backend crates into one long-running
// process: tag feed in, print queue out.

pub mod app_services;
pub mod data_dir;
