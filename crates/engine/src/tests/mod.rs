mod helpers;

mod concurrency_tests;
mod write_tests;
