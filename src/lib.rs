// Copyright 2025 Google LLC
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Scoped-resource and structured-unwind runtime.
//!
//! A [`resource::Reslist`] tracks deferred cleanup actions and nested child
//! reslists in a tree that mirrors lexical scope nesting. Allocating a
//! resource registers its cleanup against whichever reslist is
//! [`current::current`]; tearing a reslist down runs every cleanup it (and
//! its descendants) owns, most-recently-registered first. [`unwind::die`]
//! and friends perform a non-local exit to the nearest [`unwind::catch_error`]
//! frame, running every cleanup entered since that frame along the way.
//! [`signal`] extends the same discipline to signals arriving during
//! blocking I/O.

pub mod alloc;
pub mod current;
pub mod error;
pub mod resource;
pub mod signal;
pub mod unwind;
