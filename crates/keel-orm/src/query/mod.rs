//! Condition trees and the predicate compiler.

mod compiler;
mod filter;

pub use compiler::{compile, CompiledPredicate};
pub use filter::{parse_lookup, Combinator, Condition, Operator, Q};
