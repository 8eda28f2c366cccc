#[allow(unused_imports)]
pub(crate) use self::inner::*;

#[cfg(loom)]
mod inner {
    #![allow(unused_imports)]
    pub(crate) use loom::{hint, model, sync, thread};
}

#[cfg(not(loom))]
mod inner {
    #![allow(dead_code, unused_imports)]

    pub(crate) use core::{hint, sync};


    #[cfg(test)]
    pub(crate) fn model(f: impl Fn()) {
        let _trace = crate::util::trace_init();
        f()
    }
}
