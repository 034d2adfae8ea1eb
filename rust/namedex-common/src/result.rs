pub type Result<T, E = crate::error::Error> = std::result::Result<T, E>;

/// Returns an `InvalidArgument` error from the enclosing function unless `$cond` holds.
///
/// ```ignore
/// verify_arg!(bucket_bits, (4..=32).contains(&bucket_bits));
/// ```
#[macro_export]
macro_rules! verify_arg {
    ($name:ident, $cond:expr) => {
        if !$cond {
            return Err($crate::error::Error::invalid_arg(
                stringify!($name),
                concat!("expected ", stringify!($cond)),
            )
            .into());
        }
    };
}

/// Like [`verify_arg!`], for values read back from storage: fails with `InvalidFormat`.
#[macro_export]
macro_rules! verify_data {
    ($element:ident, $cond:expr) => {
        if !$cond {
            return Err($crate::error::Error::invalid_format(
                stringify!($element),
                concat!("expected ", stringify!($cond)),
            )
            .into());
        }
    };
}
