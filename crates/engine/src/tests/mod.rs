mod flush_tests;
mod helpers;
