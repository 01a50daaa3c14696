// SPDX-License-Identifier: AGPL-3.0-or-later
//! MEBDF text format: tokenizer, parser and serializer
//!
//! MEBDF is markdown plus three directive forms:
//!
//! - `{!props}text{/!}` inline spans and standalone `{!props}` block directives
//! - `{^ id}` / `{^}` anchors
//! - `{^= id type}` / `{^= equation}` embedded object placeholders

pub mod parser;
pub mod props;
pub mod serializer;
pub mod tokenizer;

pub use parser::{parse, ParseResult};
pub use serializer::{serialize, serialize_inlines};
