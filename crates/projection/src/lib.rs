/*
Copyright 2024-2025 The Graphbridge Authors

Licensed under the Apache License, Version 2.0 (the "License");
you may not use this file except in compliance with the License.
You may obtain a copy of the License at

     https://www.apache.org/licenses/LICENSE-2.0

Unless required by applicable law or agreed to in writing, software
distributed under the License is distributed on an "AS IS" BASIS,
WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
See the License for the specific language governing permissions and
limitations under the License.
*/

//! Derived views of the compiled schema: the RPC catalog, rendered `.proto`
//! files, the reflective descriptor pool, and the directive-free client
//! schema.

use snafu::prelude::*;

pub mod catalog;
pub mod descriptor;
pub mod numbering;
pub mod proto;
pub mod sdl;

pub use catalog::{Catalog, EnumDef, FieldKind, MessageDef, MessageField, MethodDef, ProtoFile, ServiceDef};

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("Field number space exhausted while numbering message {message}"))]
    NumberSpaceExhausted { message: String },

    #[snafu(display(
        "Field {field} of message {message} is a nested list, which has no proto representation"
    ))]
    NestedList { message: String, field: String },

    #[snafu(display(
        "Field {field} of message {message} references abstract type {target}, which has no proto representation"
    ))]
    AbstractProjection {
        message: String,
        field: String,
        target: String,
    },

    #[snafu(display("Unable to assemble the descriptor pool: {source}"))]
    Descriptor {
        source: prost_reflect::DescriptorError,
    },
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
