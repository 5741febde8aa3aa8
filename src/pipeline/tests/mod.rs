//! Unit tests for the pipeline drivers.
