/*---------------------------------------------------------------------------------------------
 *  Copyright (c) Microsoft Corporation. All rights reserved.
 *  Licensed under the Apache License, Version 2.0. See LICENSE.txt in the project root for license information.
 *  This software incorporates material from third parties. See NOTICE.txt for details.
 *--------------------------------------------------------------------------------------------*/

//! NIST SP 800-90B non-IID min-entropy estimator battery: symbol
//! translation, the ten estimators, the shared predictor-accounting
//! framework, BCa bootstrap aggregation, runtime health tests, and the
//! restart sanity check, wired together by an orchestrator and a thin
//! driver binary.

pub mod bootstrap;
pub mod config;
pub mod consts;
pub mod dictionary;
pub mod errors;
pub mod estimators;
pub mod health;
pub mod io;
pub mod numeric;
pub mod orchestrator;
pub mod pool;
pub mod predictor;
pub mod restart;
pub mod rng;
pub mod suffix_array;
pub mod translate;
