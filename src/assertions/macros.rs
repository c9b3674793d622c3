//! Assertion macros for unit bodies.
//!
//! Every macro takes the unit's `&mut Outcome` as its first argument and
//! returns from the enclosing body as soon as the check fails.

#[doc(hidden)]
pub fn strings_equal<A, B>(a: &A, b: &B) -> bool
where
    A: AsRef<str> + ?Sized,
    B: AsRef<str> + ?Sized,
{
    a.as_ref() == b.as_ref()
}

/// Fails the unit unless `expr` is true.
#[macro_export]
macro_rules! check {
    ($outcome:expr, $expr:expr $(,)?) => {
        if !$outcome.assert($expr, stringify!($expr), file!(), line!()) {
            return;
        }
    };
}

/// Fails the unit if `expr` is true.
#[macro_export]
macro_rules! check_not {
    ($outcome:expr, $expr:expr $(,)?) => {
        if !$outcome.assert(
            !($expr),
            concat!("!(", stringify!($expr), ")"),
            file!(),
            line!(),
        ) {
            return;
        }
    };
}

/// Fails the unit unless both strings are equal.
#[macro_export]
macro_rules! check_str_eq {
    ($outcome:expr, $left:expr, $right:expr $(,)?) => {
        if !$outcome.assert(
            $crate::assertions::strings_equal(&$left, &$right),
            concat!(stringify!($left), " == ", stringify!($right)),
            file!(),
            line!(),
        ) {
            return;
        }
    };
}

/// Fails the unit if both strings are equal.
#[macro_export]
macro_rules! check_str_ne {
    ($outcome:expr, $left:expr, $right:expr $(,)?) => {
        if !$outcome.assert(
            !$crate::assertions::strings_equal(&$left, &$right),
            concat!(stringify!($left), " != ", stringify!($right)),
            file!(),
            line!(),
        ) {
            return;
        }
    };
}

/// Ends the unit as passed.
#[macro_export]
macro_rules! pass {
    ($outcome:expr $(,)?) => {{
        $outcome.force_pass(file!(), line!());
        return;
    }};
}

/// Ends the unit as forcefully failed.
#[macro_export]
macro_rules! fail {
    ($outcome:expr $(,)?) => {{
        $outcome.force_fail(file!(), line!());
        return;
    }};
}
