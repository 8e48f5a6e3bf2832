#![warn(missing_docs)]
#![forbid(unsafe_code)]
#![doc = include_str!("../README.md")]

mod config;
mod filter;
mod hooks;
mod ledger;
mod object;
mod peek;
mod probe;
mod render;
mod session;
mod sink;
mod view;
mod walker;

pub use config::*;
pub use filter::*;
pub use hooks::*;
pub use ledger::*;
pub use object::*;
pub use peek::*;
pub use probe::*;
pub use render::*;
pub use session::*;
pub use sink::*;
pub use view::*;
pub use walker::*;

/// View expressions, labelled by their source text, through a [`Pov`].
///
/// Each expression must implement `Facet`. Without a handle the global
/// session's [`pov()`] is used.
///
/// ```
/// use facet_pov::{view, Options, Session, Sink};
///
/// let (sink, capture) = Sink::capture();
/// let session = Session::new(Options::default()).with_sink(sink);
/// let scores = vec![3, 1];
/// view!(session.pov(); scores.len(), scores);
/// assert!(capture.lines()[0].ends_with("scores.len(): 2"));
/// ```
#[macro_export]
macro_rules! view {
    ($pov:expr; $($value:expr),+ $(,)?) => {
        $pov.view(&[$((
            stringify!($value),
            &$crate::peek(&$value) as &dyn $crate::Probe,
        )),+])
    };
    ($($value:expr),+ $(,)?) => {
        $crate::view!($crate::pov(); $($value),+)
    };
}

/// `println!` routed through the global session.
#[macro_export]
macro_rules! pov_println {
    () => {
        $crate::Session::global().print(format_args!(""))
    };
    ($($arg:tt)*) => {
        $crate::Session::global().print(format_args!($($arg)*))
    };
}
