//! Tracing configuration and initialization.
//!
//! The tracing subscriber is built with a [`reload::Layer`] wrapping the fmt
//! layer so the output format can be switched at runtime (from pretty mode
//! to plain mode when daemonizing).

use std::io::IsTerminal;

use tracing_subscriber::{
    EnvFilter, Registry,
    fmt::format::FmtSpan,
    layer::SubscriberExt as _,
    reload,
    util::{SubscriberInitExt as _, TryInitError},
};

/// The type-erased fmt layer that lives inside the reload handle.
type BoxedFmtLayer = Box<dyn tracing_subscriber::Layer<Registry> + Send + Sync>;

/// The reload handle type used to swap the fmt layer at runtime.
type FmtReloadHandle = reload::Handle<BoxedFmtLayer, Registry>;

fn force_color() -> bool {
    std::env::var_os("FORCE_COLOR").is_some_and(|v| !v.is_empty())
}

fn no_color() -> bool {
    std::env::var_os("NO_COLOR").is_some_and(|v| !v.is_empty())
}

fn should_use_color<T: IsTerminal>(stream: &T) -> bool {
    force_color() || (stream.is_terminal() && !no_color())
}

/// Controls the output format of the tracing subscriber.
enum TrcMode {
    /// User-friendly, compact, colorful output.
    Pretty { use_ansi: bool },
    /// Plain, verbose, machine-readable logging.
    Plain { use_ansi: bool },
}

impl TrcMode {
    fn use_ansi(&self) -> bool {
        match self {
            Self::Pretty { use_ansi } | Self::Plain { use_ansi } => *use_ansi,
        }
    }
}

/// A handle that allows reconfiguring the tracing subscriber at runtime.
pub struct TrcHandle {
    fmt_handle: FmtReloadHandle,
}

impl TrcHandle {
    /// Reconfigure the tracing subscriber to use the given mode.
    fn reconfigure(&self, mode: &TrcMode) {
        let new_layer: BoxedFmtLayer = match mode {
            TrcMode::Pretty { use_ansi } => Box::new(
                tracing_subscriber::fmt::layer()
                    .with_ansi(*use_ansi)
                    .with_target(false)
                    .without_time()
                    .compact(),
            ),
            TrcMode::Plain { use_ansi } => Box::new(
                tracing_subscriber::fmt::layer()
                    .with_ansi(*use_ansi)
                    .with_span_events(FmtSpan::ENTER | FmtSpan::CLOSE),
            ),
        };

        if let Err(e) = self.fmt_handle.reload(new_layer) {
            eprintln!("Failed to reconfigure tracing: {e}");
        }
    }

    /// Switch to plain, colorless output suitable for a log file.
    pub fn reconfigure_for_daemon(&self) {
        self.reconfigure(&TrcMode::Plain { use_ansi: false });
    }
}

/// Builder for the tracing subscriber.
pub struct Trc {
    mode: TrcMode,
    env_filter: EnvFilter,
}

impl Default for Trc {
    fn default() -> Self {
        let use_ansi = should_use_color(&std::io::stderr());
        let maybe_env_filter =
            EnvFilter::try_from_env("DOCKER_FS_LOG").or_else(|_| EnvFilter::try_from_default_env());

        match maybe_env_filter {
            Ok(env_filter) => Self {
                // If the user provided an env_filter, they probably know what
                // they're doing and don't want fancy formatting. Default to
                // plain mode.
                mode: TrcMode::Plain { use_ansi },
                env_filter,
            },
            Err(_) => Self {
                // No env_filter means the user just wants a nice
                // out-of-the-box experience: compact output, info level.
                mode: TrcMode::Pretty { use_ansi },
                env_filter: EnvFilter::new("info"),
            },
        }
    }
}

impl Trc {
    /// Initialize the global tracing subscriber and return a handle for
    /// runtime reconfiguration.
    pub fn init(self) -> Result<TrcHandle, TryInitError> {
        let use_ansi = self.mode.use_ansi();

        let initial_layer: BoxedFmtLayer = match self.mode {
            TrcMode::Pretty { .. } => Box::new(
                tracing_subscriber::fmt::layer()
                    .with_ansi(use_ansi)
                    .with_target(false)
                    .without_time()
                    .compact(),
            ),
            TrcMode::Plain { .. } => Box::new(
                tracing_subscriber::fmt::layer()
                    .with_ansi(use_ansi)
                    .with_span_events(FmtSpan::ENTER | FmtSpan::CLOSE),
            ),
        };

        let (reload_layer, fmt_handle) = reload::Layer::new(initial_layer);

        tracing_subscriber::registry()
            .with(reload_layer)
            .with(self.env_filter)
            .try_init()?;

        Ok(TrcHandle { fmt_handle })
    }
}
