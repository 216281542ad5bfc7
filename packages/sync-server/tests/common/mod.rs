pub mod harness;

#[allow(unused_imports)]
pub use harness::{wait_for, TestHarness};
