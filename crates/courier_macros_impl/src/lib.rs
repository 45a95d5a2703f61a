// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

#![cfg_attr(coverage_nightly, feature(coverage_attribute))]
#![cfg_attr(docsrs, feature(doc_cfg))]
#![doc(hidden)]

//! Macros for the [`courier`](https://docs.rs/courier) crate.

pub mod classify;
pub mod client;
pub mod metadata;
mod params;
pub mod syn_helpers;
mod synth;
