// Cross-module tests
pub mod test_acquisition;
