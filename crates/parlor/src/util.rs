use crate::types::Set;
use std::fmt;

pub(crate) fn display_fn<F>(f: F) -> impl fmt::Display
where
    F: Fn(&mut fmt::Formatter<'_>) -> fmt::Result,
{
    struct DisplayFn<F> {
        f: F,
    }
    impl<F> fmt::Display for DisplayFn<F>
    where
        F: Fn(&mut fmt::Formatter<'_>) -> fmt::Result,
    {
        fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
            (self.f)(formatter)
        }
    }
    DisplayFn { f }
}

/// Pick a name not present in `taken`, appending an incrementing `_k` suffix
/// when the base collides.
pub(crate) fn fresh_name(base: &str, taken: &Set<String>) -> String {
    if !taken.contains(base) {
        return base.to_owned();
    }
    let mut k = 1usize;
    loop {
        let candidate = format!("{}_{}", base, k);
        if !taken.contains(&candidate) {
            return candidate;
        }
        k += 1;
    }
}
