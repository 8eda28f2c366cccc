#![doc = include_str!("../README.md")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg, doc_cfg_hide))]
#![cfg_attr(docsrs, doc(cfg_hide(docsrs, loom)))]
#![cfg_attr(not(any(test, feature = "std")), no_std)]
#![warn(missing_docs, missing_debug_implementations)]

#[macro_use]
mod util;

pub(crate) mod loom;

pub mod acquire;
pub mod backoff;
pub mod config;
pub mod estimate;
pub mod flag;
pub mod mutex;
pub mod selftest;
pub mod stuck;

#[cfg(feature = "std")]
#[doc(inline)]
pub use self::acquire::ThreadSleep;
#[doc(inline)]
pub use self::acquire::{DefaultSleep, Sleep, SpinContext};
#[doc(inline)]
pub use self::backoff::Backoff;
#[doc(inline)]
pub use self::config::{Config, ConfigError};
#[doc(inline)]
pub use self::estimate::SpinEstimate;
#[doc(inline)]
pub use self::flag::{AtomicFlag, SLock};
#[doc(inline)]
pub use self::mutex::{Mutex, MutexGuard};
#[doc(inline)]
pub use self::selftest::SelfTestError;
#[doc(inline)]
pub use self::stuck::{StuckHandler, StuckLock};
