//! Shorthands for building [`crate::error::EtlError`] values where a failure happens, so the
//! recorded location is the caller's.

/// Builds an [`crate::error::EtlError`].
///
/// Forms:
/// - `etl_error!(kind, "description")`
/// - `etl_error!(kind, "description", detail)`, where `detail` is rendered with `to_string`
/// - `etl_error!(kind, "description", detail = owned_string)`, which moves the detail
///
/// Each form may end with `source: err` to keep the underlying error.
#[macro_export]
macro_rules! etl_error {
    ($kind:expr, $desc:expr $(, source: $source:expr)?) => {
        $crate::error::EtlError::from(($kind, $desc))
            $(.with_source($source))?
    };
    ($kind:expr, $desc:expr, detail = $detail:expr $(, source: $source:expr)?) => {
        $crate::error::EtlError::from(($kind, $desc, $detail))
            $(.with_source($source))?
    };
    ($kind:expr, $desc:expr, $detail:expr $(, source: $source:expr)?) => {
        $crate::error::EtlError::from(($kind, $desc, $detail.to_string()))
            $(.with_source($source))?
    };
}

/// Returns `Err` built by [`etl_error!`] from the current function.
#[macro_export]
macro_rules! bail {
    ($($args:tt)+) => {
        return ::core::result::Result::Err($crate::etl_error!($($args)+))
    };
}
