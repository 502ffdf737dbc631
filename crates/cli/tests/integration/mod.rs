pub mod account_tests;
pub mod common;
pub mod convert_tests;
pub mod inspect_tests;
