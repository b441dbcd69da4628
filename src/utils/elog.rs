/// User-facing progress line on stderr, suppressed by `--quiet`.
/// stdout carries command output only.
#[macro_export]
macro_rules! elog {
    (quiet = $quiet:expr, $($args:tt)*) => {
        if !$quiet {
            eprintln!($($args)*)
        }
    };
}
