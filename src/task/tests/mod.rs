//! Unit tests for the task lifecycle module.

mod store_tests;
