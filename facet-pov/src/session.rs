//! The session context and the call-site handle ([`Pov`]) that emits through it.
//!
//! Every emission is gated by [`Session::is_active`] before anything is
//! formatted or walked, so calls whose priority id is filtered out cost one
//! lock and one interval scan.

use core::cell::Cell;
use core::fmt::{self, Display};
use std::io::{self, Write};
use std::panic::{self, AssertUnwindSafe, PanicHookInfo};
use std::process;
use std::sync::{Mutex, MutexGuard, OnceLock, PoisonError, TryLockError};

use facet_core::Facet;
use owo_colors::OwoColorize;

use crate::{
    ConfigError, Depth, Detail, EnvSource, FilterSet, NodeKind, Obj, Options, Probe, Renderer,
    Scope, Sink, StdEnv, Walker, peek,
};

/// Line written instead of output when a pov call is made while another one
/// on the same thread is still formatting or walking.
pub const NESTED_CALL_MARKER: &str = "<nested pov call suppressed>";

thread_local! {
    static RENDERING: Cell<bool> = const { Cell::new(false) };
    static NESTING: Cell<usize> = const { Cell::new(0) };
}

/// Set while one pov call is formatting or walking on this thread.
struct RenderGuard(());

impl RenderGuard {
    fn enter() -> Option<Self> {
        if RENDERING.with(|flag| flag.replace(true)) {
            None
        } else {
            Some(RenderGuard(()))
        }
    }
}

impl Drop for RenderGuard {
    fn drop(&mut self) {
        RENDERING.with(|flag| flag.set(false));
    }
}

/// One level of [`Pov::track`] nesting; shows up as an extra bar.
struct NestingGuard(());

impl NestingGuard {
    fn enter() -> Self {
        NESTING.with(|n| n.set(n.get() + 1));
        NestingGuard(())
    }
}

impl Drop for NestingGuard {
    fn drop(&mut self) {
        NESTING.with(|n| n.set(n.get().saturating_sub(1)));
    }
}

fn nesting() -> usize {
    NESTING.with(Cell::get)
}

/// Kind of an output line, shown right after the `POV` head.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Mark {
    /// `[i]` plain information
    Info,
    /// `[+]` a success or a rendered value
    Ok,
    /// `[!]` a warning
    Warn,
    /// `[-]` a failure
    Bad,
    /// `[f]` function entry and exit
    Func,
    /// `[a]` a change to a tracked attribute or container
    Attr,
    /// `[ ]` routed host output
    Norm,
}

impl Mark {
    /// The bracketed symbol.
    pub fn symbol(self) -> &'static str {
        match self {
            Mark::Info => "[i]",
            Mark::Ok => "[+]",
            Mark::Warn => "[!]",
            Mark::Bad => "[-]",
            Mark::Func => "[f]",
            Mark::Attr => "[a]",
            Mark::Norm => "[ ]",
        }
    }

    fn painted(self) -> String {
        let symbol = self.symbol();
        match self {
            Mark::Info => symbol.blue().to_string(),
            Mark::Ok => symbol.green().to_string(),
            Mark::Warn => symbol.yellow().to_string(),
            Mark::Bad => symbol.red().to_string(),
            Mark::Func => symbol.magenta().to_string(),
            Mark::Attr => symbol.green().italic().to_string(),
            Mark::Norm => symbol.to_string(),
        }
    }
}

impl Display for Mark {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

#[derive(Debug)]
struct State {
    enabled: bool,
    detail: Detail,
    filter: FilterSet,
    sink: Sink,
    color: bool,
    keep_native_print: bool,
    keep_native_panic_hook: bool,
    report_env: Vec<String>,
}

impl State {
    fn format_line(&self, mark: Mark, text: &str) -> String {
        let bars = "|".repeat(nesting() + 1);
        let pid = process::id();
        if self.color {
            format!(
                "{} {} {} {} {text}",
                "POV".bold(),
                mark.painted(),
                pid.dimmed(),
                bars.dimmed()
            )
        } else {
            format!("POV {mark} {pid} {bars} {text}")
        }
    }

    fn write(&mut self, mark: Mark, text: &str) {
        for line in text.split('\n') {
            let line = self.format_line(mark, line);
            if let Err(err) = self.sink.write_line(&line) {
                self.degrade(err);
                return;
            }
        }
    }

    /// After the first failed write the sink is replaced by [`Sink::Null`].
    fn degrade(&mut self, err: io::Error) {
        tracing::warn!(%err, "pov output failed, further output is discarded");
        let _ = writeln!(
            io::stderr(),
            "POV {} {} | output failed: {err}; further output is discarded",
            Mark::Bad,
            process::id()
        );
        self.sink = Sink::Null;
        self.color = false;
    }
}

/// Process-wide pov context: default detail, id filter, enabled flag and sink.
///
/// The lock is only held while reading settings or writing finished lines,
/// never while values are walked.
#[derive(Debug)]
pub struct Session {
    state: Mutex<State>,
}

static GLOBAL: OnceLock<Session> = OnceLock::new();

impl Session {
    /// A session for the given options.
    ///
    /// If `redirect_output` cannot be opened, the session falls back to stderr
    /// and says so once.
    pub fn new(options: Options) -> Self {
        let (sink, open_error) = match &options.redirect_output {
            Some(path) => match Sink::open(path) {
                Ok(sink) => (sink, None),
                Err(err) => (Sink::Stderr, Some(format!("cannot open {}: {err}", path.display()))),
            },
            None => (Sink::Stderr, None),
        };

        let session = Session {
            state: Mutex::new(State {
                enabled: !options.disable_all,
                detail: options.detail,
                filter: options.filter,
                color: sink.supports_color(),
                sink,
                keep_native_print: options.keep_native_print,
                keep_native_panic_hook: options.keep_native_panic_hook,
                report_env: options.report_env,
            }),
        };

        if let Some(message) = open_error {
            tracing::warn!("{message}, writing to stderr");
            session.state().write(Mark::Warn, &format!("{message}; writing to stderr"));
        }
        session
    }

    /// A session configured from the process environment.
    pub fn from_env() -> Self {
        Self::from_env_source(&StdEnv)
    }

    /// A session configured from `env`. Configuration problems and the
    /// `report-env` variables are written once, right away.
    pub fn from_env_source(env: &impl EnvSource) -> Self {
        let (options, errors) = Options::from_env(env);
        let session = Self::new(options);
        session.report_startup(&errors, env);
        session
    }

    /// The process-wide session, created from the environment on first use.
    pub fn global() -> &'static Session {
        GLOBAL.get_or_init(Session::from_env)
    }

    /// Builder: replace the sink.
    pub fn with_sink(self, sink: Sink) -> Self {
        {
            let mut state = self.state();
            state.color = sink.supports_color();
            state.sink = sink;
        }
        self
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Write the start-up report: one warning per configuration error, then
    /// the value of every `report-env` variable.
    pub fn report_startup(&self, errors: &[ConfigError], env: &impl EnvSource) {
        let mut state = self.state();
        if !state.enabled {
            return;
        }
        for err in errors {
            tracing::warn!(%err, "pov configuration");
            state.write(Mark::Warn, &err.to_string());
        }
        for name in state.report_env.clone() {
            match env.get(&name) {
                Some(value) => state.write(Mark::Info, &format!("{name} = {value:?}")),
                None => state.write(Mark::Info, &format!("{name} is not set")),
            }
        }
    }

    /// Replace the priority-id filter.
    pub fn set_filter(&self, filter: FilterSet) {
        tracing::debug!(%filter, "pov filter changed");
        self.state().filter = filter;
    }

    /// Turn every emission on or off, independently of the filter.
    pub fn set_enabled(&self, enabled: bool) {
        self.state().enabled = enabled;
    }

    /// Whether emissions are enabled at all.
    pub fn is_enabled(&self) -> bool {
        self.state().enabled
    }

    /// Replace the default detail read by handles without an override.
    pub fn set_detail(&self, detail: Detail) {
        self.state().detail = detail;
    }

    /// The default detail.
    pub fn detail(&self) -> Detail {
        self.state().detail
    }

    /// Whether a call tagged `id` produces output.
    pub fn is_active(&self, id: i64) -> bool {
        let state = self.state();
        state.enabled && state.filter.contains(id)
    }

    /// Whether the native panic hook is to be left alone.
    pub fn keeps_native_panic_hook(&self) -> bool {
        self.state().keep_native_panic_hook
    }

    /// A call-site handle with priority id 0.
    pub fn pov(&self) -> Pov<'_> {
        Pov {
            session: self,
            id: 0,
            detail: None,
        }
    }

    /// Route host print output through the sink.
    ///
    /// With keep-native-print, or while the session is disabled, the text
    /// goes to stdout untouched.
    pub fn print(&self, args: fmt::Arguments<'_>) {
        let native = {
            let state = self.state();
            state.keep_native_print || !state.enabled
        };
        if native {
            let _ = writeln!(io::stdout().lock(), "{args}");
            return;
        }
        let text = args.to_string();
        self.state().write(Mark::Norm, &text);
    }

    fn write(&self, mark: Mark, text: &str) {
        self.state().write(mark, text);
    }

    fn write_all(&self, lines: &[(Mark, String)]) {
        let mut state = self.state();
        for (mark, line) in lines {
            state.write(*mark, line);
        }
    }

    pub(crate) fn report_panic(&self, info: &PanicHookInfo<'_>) {
        let mut state = match self.state.try_lock() {
            Ok(state) => state,
            Err(TryLockError::Poisoned(poisoned)) => poisoned.into_inner(),
            // The panic came from inside a write on this session.
            Err(TryLockError::WouldBlock) => return,
        };
        if !state.enabled {
            return;
        }
        state.write(Mark::Bad, &format!("Terminated with panic: {}", panic_message(info.payload())));
        if let Some(location) = info.location() {
            state.write(Mark::Bad, &format!("at {location}"));
        }
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new(Options::default())
    }
}

/// A call-site handle on the global session.
pub fn pov() -> Pov<'static> {
    Session::global().pov()
}

fn panic_message(payload: &(dyn core::any::Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_owned()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "Box<dyn Any>".to_owned()
    }
}

/// A call site: a priority id and an optional detail override.
///
/// ```
/// use facet_pov::{peek, Options, Session, Sink};
///
/// let (sink, capture) = Sink::capture();
/// let session = Session::new(Options::default()).with_sink(sink);
/// let pov = session.pov().at(5);
/// pov.view(&[("answer", &peek(&42))]);
/// assert!(capture.contents().ends_with("answer: 42"));
/// ```
#[derive(Clone, Copy, Debug)]
pub struct Pov<'s> {
    session: &'s Session,
    id: i64,
    detail: Option<Detail>,
}

impl<'s> Pov<'s> {
    /// The same handle with another priority id.
    pub fn at(mut self, id: i64) -> Self {
        self.id = id;
        self
    }

    /// The priority id.
    pub fn id(&self) -> i64 {
        self.id
    }

    /// The session this handle emits through.
    pub fn session(&self) -> &'s Session {
        self.session
    }

    /// Change the level of detail.
    ///
    /// `depth` is `-1` for unbounded or a non-negative level. `full: None`
    /// keeps the current visibility. With [`Scope::Global`] the session
    /// default changes as well, so every handle without an override follows.
    pub fn detail(
        &mut self,
        depth: i64,
        full: Option<bool>,
        scope: Scope,
    ) -> Result<&mut Self, ConfigError> {
        let depth = Depth::from_level(depth)?;
        let current = self.effective_detail();
        let detail = Detail::new(depth, full.unwrap_or(current.full));
        if scope == Scope::Global {
            self.session.set_detail(detail);
        }
        self.detail = Some(detail);
        Ok(self)
    }

    /// Drop the instance override; the session default applies again.
    pub fn clear_detail(&mut self) -> &mut Self {
        self.detail = None;
        self
    }

    /// The detail a walk would use right now.
    pub fn effective_detail(&self) -> Detail {
        self.detail.unwrap_or_else(|| self.session.detail())
    }

    /// Whether this handle's calls currently produce output.
    pub fn is_active(&self) -> bool {
        self.session.is_active(self.id)
    }

    fn walker(&self) -> Walker {
        Walker::from_detail(self.effective_detail())
    }

    /// Run `f` with the re-entrancy guard held. A nested call gets the marker
    /// line instead.
    fn guarded<T>(&self, f: impl FnOnce() -> T) -> Option<T> {
        let Some(_guard) = RenderGuard::enter() else {
            self.session.write(Mark::Warn, NESTED_CALL_MARKER);
            return None;
        };
        Some(f())
    }

    /// Write `message` with the given mark.
    pub fn emit(&self, mark: Mark, message: impl Display) -> &Self {
        if !self.is_active() {
            return self;
        }
        if let Some(text) = self.guarded(|| message.to_string()) {
            self.session.write(mark, &text);
        }
        self
    }

    /// Write an information line.
    pub fn info(&self, message: impl Display) -> &Self {
        self.emit(Mark::Info, message)
    }

    /// Write a success line.
    pub fn ok(&self, message: impl Display) -> &Self {
        self.emit(Mark::Ok, message)
    }

    /// Write a warning line.
    pub fn warn(&self, message: impl Display) -> &Self {
        self.emit(Mark::Warn, message)
    }

    /// Write a failure line.
    pub fn bad(&self, message: impl Display) -> &Self {
        self.emit(Mark::Bad, message)
    }

    /// Walk and render each labelled value.
    pub fn view(&self, values: &[(&str, &dyn Probe)]) -> &Self {
        self.view_inner(None, values)
    }

    /// Like [`Pov::view`], preceded by a title line.
    pub fn view_titled(&self, title: impl Display, values: &[(&str, &dyn Probe)]) -> &Self {
        self.view_inner(Some(&title), values)
    }

    fn view_inner(&self, title: Option<&dyn Display>, values: &[(&str, &dyn Probe)]) -> &Self {
        if !self.is_active() {
            return self;
        }
        let rendered = self.guarded(|| {
            let walker = self.walker();
            let renderer = Renderer::new();
            let mut lines = Vec::new();
            if let Some(title) = title {
                lines.push((Mark::Ok, format!("{title}:")));
            }
            for (label, value) in values {
                let view = walker.walk(*value, label);
                let mark = if view.kind == NodeKind::Error {
                    Mark::Bad
                } else {
                    Mark::Ok
                };
                lines.extend(renderer.render(&view).into_iter().map(|line| (mark, line)));
            }
            lines
        });
        if let Some(lines) = rendered {
            self.session.write_all(&lines);
        }
        self
    }

    /// Call `f`, reporting entry with the rendered `args` and exit with the
    /// rendered result.
    ///
    /// Lines written while `f` runs get one more bar. A panic in `f` is
    /// reported and then resumed.
    pub fn track<'f, R, F>(&self, name: &str, args: &[(&str, &dyn Probe)], f: F) -> R
    where
        R: Facet<'f>,
        F: FnOnce() -> R,
    {
        if !self.is_active() {
            return f();
        }
        let Some(entry) = self.guarded(|| {
            let walker = self.walker();
            let renderer = Renderer::new();
            let mut lines = vec![(Mark::Func, format!("{name}("))];
            for (label, value) in args {
                let view = walker.walk(*value, label);
                lines.extend(
                    renderer
                        .render(&view)
                        .into_iter()
                        .map(|line| (Mark::Func, format!("  {line}"))),
                );
            }
            lines
        }) else {
            return f();
        };
        self.session.write_all(&entry);

        let outcome = {
            let _nesting = NestingGuard::enter();
            panic::catch_unwind(AssertUnwindSafe(f))
        };

        match outcome {
            Ok(result) => {
                let exit = self.guarded(|| {
                    let view = self.walker().walk(&peek(&result), "");
                    let mut lines = Renderer::new().render_unlabelled(&view).into_iter();
                    let first = lines.next().unwrap_or_default();
                    let mut exit = vec![(Mark::Ok, format!(") => {first}"))];
                    exit.extend(lines.map(|line| (Mark::Ok, line)));
                    exit
                });
                if let Some(exit) = exit {
                    self.session.write_all(&exit);
                }
                result
            }
            Err(payload) => {
                let message = panic_message(&*payload);
                self.session
                    .write(Mark::Bad, &format!(") >< panicked: {message}"));
                panic::resume_unwind(payload)
            }
        }
    }

    /// Report each labelled condition; true when all hold.
    pub fn check(&self, checks: &[(&str, bool)]) -> bool {
        let all = checks.iter().all(|(_, holds)| *holds);
        if !self.is_active() {
            return all;
        }
        let mut lines = vec![(Mark::Info, "Assertions:".to_owned())];
        for (label, holds) in checks {
            let mark = if *holds { Mark::Ok } else { Mark::Warn };
            lines.push((mark, format!("{label} => {holds}")));
        }
        if all {
            lines.push((Mark::Ok, "All checks passed.".to_owned()));
        } else {
            lines.push((Mark::Warn, "Some assertions failed.".to_owned()));
        }
        self.session.write_all(&lines);
        all
    }

    /// Log `value` under `label` and hand it back unchanged.
    pub fn nop<'f, T: Facet<'f>>(&self, label: &str, value: T) -> T {
        if !self.is_active() {
            return value;
        }
        let rendered = self.guarded(|| {
            let view = self.walker().walk(&peek(&value), label);
            Renderer::new()
                .render(&view)
                .into_iter()
                .map(|line| (Mark::Info, line))
                .collect::<Vec<_>>()
        });
        if let Some(lines) = rendered {
            self.session.write_all(&lines);
        }
        value
    }
}

impl Pov<'static> {
    /// Report every stored change to `obj` as `<owner><path> := <value>`.
    ///
    /// `names` limits which record attributes are reported; empty means all
    /// of them. Lists and dicts stored into a tracked object are tracked in
    /// turn, under `<owner>.<attr>`. Each change is gated by this handle's id
    /// when it happens, not when tracking starts.
    ///
    /// ```
    /// use facet_pov::{Obj, Options, Session, Sink};
    ///
    /// let (sink, capture) = Sink::capture();
    /// let session: &'static Session =
    ///     Box::leak(Box::new(Session::new(Options::default()).with_sink(sink)));
    /// let point = Obj::record("Point").with_attr("x", 0);
    /// session.pov().track_attrs(&point, "point", &["x"]);
    /// point.set_attr("x", 3);
    /// assert!(capture.contents().ends_with("| point.x := 3"));
    /// ```
    pub fn track_attrs(&self, obj: &Obj, owner: &str, names: &[&str]) -> &Self {
        let what = if names.is_empty() {
            "all attrs".to_owned()
        } else {
            names.join(", ")
        };
        self.emit(Mark::Info, format_args!("Tracking {what} for {owner}"));
        attach(*self, obj, owner.to_owned(), names);
        self
    }

    fn report_change(&self, target: &str, value: &Obj) {
        if !self.is_active() {
            return;
        }
        let rendered = self.guarded(|| {
            let view = self.walker().walk(value, "");
            let mut lines = Renderer::new().render_unlabelled(&view).into_iter();
            let first = lines.next().unwrap_or_default();
            let mut change = vec![(Mark::Attr, format!("{target} := {first}"))];
            change.extend(lines.map(|line| (Mark::Attr, line)));
            change
        });
        if let Some(lines) = rendered {
            self.session.write_all(&lines);
        }
    }
}

fn attach(pov: Pov<'static>, obj: &Obj, owner: String, names: &[&str]) {
    obj.watch(names, move |path, value| {
        let target = format!("{owner}{path}");
        pov.report_change(&target, value);
        if value.is_container() && !value.is_watched() {
            attach(pov, value, target, &[]);
        }
    });
}
