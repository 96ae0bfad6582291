/// Asserts two floats agree to within `tol`.
#[macro_export]
macro_rules! assert_close {
    ($left:expr, $right:expr, $tol:expr) => {
        let (l, r): (f64, f64) = ($left, $right);
        assert!(
            (l - r).abs() <= $tol,
            "{} and {} differ by more than {}",
            l,
            r,
            $tol
        );
    };
}

/// Asserts a worker response completed, printing its payload otherwise.
#[macro_export]
macro_rules! assert_complete {
    ($response:expr) => {
        assert!(
            $response.is_complete(),
            "{:?} failed: {:?}",
            $response.cmd,
            $response.input
        );
    };
}
