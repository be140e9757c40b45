pub mod collector;
pub mod config;
pub mod input;
pub mod job;
pub mod mediawiki;
pub mod mover;
pub mod options;
pub mod persistence;
pub mod planner;
pub mod replacement;
pub mod report;
pub mod rewriter;
pub mod runtime;
pub mod store;
pub mod syntax;
pub mod title;

#[cfg(test)]
mod testing;
