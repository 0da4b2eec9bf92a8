use serde::{Serialize, Deserialize};

/// Lazily computed value that is reset on every model mutation
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Cached<T> {
    Unknown,
    Computed(T),
}

impl<T> Default for Cached<T> {
    fn default() -> Self {
        Cached::Unknown
    }
}

impl<T> Cached<T> {
    pub fn is_known(&self) -> bool {
        matches!(self, Cached::Computed(_))
    }

    pub fn get(&self) -> Option<&T> {
        match self {
            Cached::Computed(value) => Some(value),
            Cached::Unknown => None,
        }
    }

    pub fn invalidate(&mut self) {
        *self = Cached::Unknown;
    }

    pub fn set(&mut self, value: T) -> &T {
        *self = Cached::Computed(value);
        match self {
            Cached::Computed(value) => value,
            Cached::Unknown => unreachable!("value was just stored"),
        }
    }

    /// Return the cached value, computing and storing it first if unknown
    pub fn get_or_compute<F>(&mut self, compute: F) -> &T
    where
        F: FnOnce() -> T,
    {
        if let Cached::Unknown = self {
            *self = Cached::Computed(compute());
        }
        match self {
            Cached::Computed(value) => value,
            Cached::Unknown => unreachable!("value was just computed"),
        }
    }

    /// Fallible variant of [`Cached::get_or_compute`]; stays unknown on error
    pub fn get_or_try_compute<E, F>(&mut self, compute: F) -> Result<&T, E>
    where
        F: FnOnce() -> Result<T, E>,
    {
        if let Cached::Unknown = self {
            let value = compute()?;
            *self = Cached::Computed(value);
        }
        match self {
            Cached::Computed(value) => Ok(value),
            Cached::Unknown => unreachable!("value was just computed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compute_once_until_invalidated() {
        let mut cached: Cached<u32> = Cached::default();
        let mut calls = 0;
        for _ in 0..3 {
            let value = cached
                .get_or_try_compute::<(), _>(|| {
                    calls += 1;
                    Ok(42)
                })
                .unwrap();
            assert_eq!(*value, 42);
        }
        assert_eq!(calls, 1);

        cached.invalidate();
        assert!(!cached.is_known());
        cached.get_or_try_compute::<(), _>(|| {
            calls += 1;
            Ok(7)
        })
        .unwrap();
        assert_eq!(calls, 2);
        assert_eq!(cached.get(), Some(&7));
    }

    #[test]
    fn test_failed_compute_stays_unknown() {
        let mut cached: Cached<u32> = Cached::Unknown;
        let result = cached.get_or_try_compute(|| Err("boom"));
        assert_eq!(result, Err("boom"));
        assert!(!cached.is_known());
    }
}
