pub mod numerical_check;

pub use numerical_check::{check_matrix, NumericalIssue};
