//! Internal utilities: diagnostic macros, formatting helpers and test setup.

#[cfg(all(not(test), not(all(hyphae_ultraverbose, feature = "std"))))]
macro_rules! test_dbg {
    ($e:expr) => {
        $e
    };
}

#[cfg(any(test, all(hyphae_ultraverbose, feature = "std")))]
macro_rules! test_dbg {
    ($e:expr) => {
        match $e {
            e => {
                tracing::debug!(
                    location = %core::panic::Location::caller(),
                    "{} = {:?}",
                    stringify!($e),
                    &e
                );
                e
            }
        }
    };
}

#[cfg(all(not(test), not(all(hyphae_ultraverbose, feature = "std"))))]
macro_rules! test_trace {
    ($($t:tt)*) => {};
}

#[cfg(any(test, all(hyphae_ultraverbose, feature = "std")))]
macro_rules! test_trace {
    ($($t:tt)*) => { tracing::trace!($($t)*) }
}

macro_rules! feature {
    (
        #![$meta:meta]
        $($item:item)*
    ) => {
        $(
            #[cfg($meta)]
            #[cfg_attr(docsrs, doc(cfg($meta)))]
            $item
        )*
    }
}

macro_rules! loom_const_fn {
    (
        $(#[$meta:meta])*
        $vis:vis fn $name:ident($($arg:ident: $T:ty),*) -> $Ret:ty $body:block
    ) => {
        $(#[$meta])*
        #[cfg(not(loom))]
        $vis const fn $name($($arg: $T),*) -> $Ret $body

        $(#[$meta])*
        #[cfg(loom)]
        $vis fn $name($($arg: $T),*) -> $Ret $body
    }
}

pub(crate) mod fmt {
    pub(crate) use core::fmt::*;

    /// Formats the wrapped value using a provided function.
    pub(crate) struct FormatWith<T, F = fn(&T, &mut Formatter<'_>) -> Result>
    where
        F: Fn(&T, &mut Formatter<'_>) -> Result,
    {
        value: T,
        fmt: F,
    }

    /// Formats a lock address as `0x...`, for recording in `tracing` fields.
    #[inline]
    #[must_use]
    pub(crate) fn ptr(addr: usize) -> FormatWith<usize> {
        FormatWith {
            value: addr,
            fmt: |addr, f| write!(f, "{:#x}", addr),
        }
    }

    impl<T, F> Debug for FormatWith<T, F>
    where
        F: Fn(&T, &mut Formatter<'_>) -> Result,
    {
        #[inline]
        fn fmt(&self, f: &mut Formatter<'_>) -> Result {
            (self.fmt)(&self.value, f)
        }
    }

    impl<T, F> Display for FormatWith<T, F>
    where
        F: Fn(&T, &mut Formatter<'_>) -> Result,
    {
        #[inline]
        fn fmt(&self, f: &mut Formatter<'_>) -> Result {
            (self.fmt)(&self.value, f)
        }
    }
}

#[cfg(test)]
pub(crate) fn trace_init() -> impl Drop {
    use tracing_subscriber::{util::SubscriberInitExt, EnvFilter};
    let filter = EnvFilter::from_env("RUST_LOG");
    tracing_subscriber::fmt()
        .with_test_writer()
        .without_time()
        .with_env_filter(filter)
        .with_thread_names(true)
        .set_default()
}

#[cfg(all(test, not(loom)))]
mod tests {
    use super::*;
    use tracing::subscriber::NoSubscriber;

    fn has_subscriber() -> bool {
        tracing::dispatcher::get_default(|dispatch| dispatch.downcast_ref::<NoSubscriber>().is_none())
    }

    #[test]
    fn trace_init_scopes_subscriber() {
        assert!(!has_subscriber());
        {
            let _trace = trace_init();
            assert!(has_subscriber());
        }
        assert!(!has_subscriber());
    }

    #[test]
    fn ptr_formats_as_hex() {
        assert_eq!(fmt::ptr(0xdead_beef).to_string(), "0xdeadbeef");
        assert_eq!(format!("{:?}", fmt::ptr(16)), "0x10");
    }
}
