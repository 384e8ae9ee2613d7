//! A rust library for composing large N-dimensional arrays from a graph of lazy region of interest operators.
//!
//! An operator answers region of interest queries on its outputs by computing only the requested box, possibly by issuing further queries to its own inputs.
//! This crate implements the region of interest translation and composition layer of such operators:
//!  - deriving output metadata from input metadata ([`operator::Operator::setup_outputs`]),
//!  - mapping an output region into upstream regions and executing those requests into a caller supplied buffer ([`operator::Operator::execute`]), and
//!  - translating an upstream dirty region into the minimal downstream dirty region ([`operator::Operator::propagate_dirty`]).
//!
//! ## Getting Started
//! - [`roi::Roi`] is the region of interest, a half-open box over the axes of an array.
//! - [`slot`] has the slots that connect operators and the [`slot::ArraySource`] trait for anything answering region of interest queries.
//! - [`operator`] has the [`operator::Operator`] trait and the composition operators.
//!
//! ## Example
//! ```rust
//! # use std::sync::Arc;
//! use roiflow::{
//!     array::AxisTags,
//!     operator::{OpMultiArrayStacker, Operator},
//!     roi::Roi,
//!     slot::{ArraySourceExt, MemorySource},
//! };
//!
//! let image0 = MemorySource::from_elements(vec![2, 2], AxisTags::from_keys("yx"), vec![0u8, 1, 2, 3])?;
//! let image1 = MemorySource::from_elements(vec![2, 2], AxisTags::from_keys("yx"), vec![4u8, 5, 6, 7])?;
//!
//! let stacker = Arc::new(OpMultiArrayStacker::new());
//! stacker.images.push(Arc::new(image0));
//! stacker.images.push(Arc::new(image1));
//! stacker.axis_flag.set("z".to_string());
//! stacker.axis_index.set(0);
//! stacker.setup_outputs()?;
//!
//! let stacked = stacker.output();
//! assert_eq!(stacked.meta().shape, vec![2, 2, 2]);
//! let column: Vec<u8> = stacked.retrieve_typed(&Roi::new_with_ranges(&[0..2, 0..2, 1..2]))?;
//! assert_eq!(column, vec![1, 3, 5, 7]);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! ## Crate Features
//! #### Default
//!  - `ndarray`: [`ndarray`] utility functions for [`slot::ArraySource`] and [`slot::MemorySource`].
//!
//! ## Logging
//! The crate logs with [`tracing`] and never installs a subscriber.
//! Configure results are logged at `debug`, request fan-out at `trace`, and dirty notifications on unknown slots at `warn`.
//!
//! ## Licence
//! `roiflow` is licensed under either of
//!  - the Apache License, Version 2.0 <http://www.apache.org/licenses/LICENSE-2.0> or
//!  - the MIT license <http://opensource.org/licenses/MIT>, at your option.

#![warn(unused_variables)]
#![warn(dead_code)]
#![deny(missing_docs)]
// #![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![deny(clippy::missing_panics_doc)]
#![cfg_attr(docsrs, feature(doc_auto_cfg))]

pub mod array;
pub mod config;
pub mod operator;
pub mod roi;
pub mod slot;
