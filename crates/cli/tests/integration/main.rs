mod common;

mod build_tests;
mod clean_tests;
mod ops_tests;
mod products_tests;
