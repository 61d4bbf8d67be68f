//! Fixtures shared by unit tests

pub mod test_utils;
