mod account_tests;
mod common;
mod pipeline_tests;
mod render_tests;
