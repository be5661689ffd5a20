//! Initialisation of the stdout tracing subscriber.
use tracing_subscriber::{EnvFilter, Layer, layer::SubscriberExt};

/// Options controlling how [TracerEngine] sets up the subscriber.
pub struct TracerOptions<'a> {
    /// Filter directives used when `RUST_LOG` is not set, e.g. `"info"`.
    pub default_directives: &'a str,
    /// Emit logs in a compact, single line format.
    pub compact: bool,
}

impl<'a> TracerOptions<'a> {
    pub fn new(default_directives: &'a str, compact: bool) -> Self {
        Self {
            default_directives,
            compact,
        }
    }
}

impl Default for TracerOptions<'_> {
    fn default() -> Self {
        Self::new("info", false)
    }
}

/// Installs the global tracing subscriber for a component.
pub struct TracerEngine {
    service_name: String,
}

impl TracerEngine {
    /// Installs a stdout `fmt` layer filtered by `RUST_LOG`, or by the option's
    /// default directives if the environment variable is unset.
    ///
    /// # Parameters
    /// - options: the caller specified [TracerOptions].
    /// - service_name: name of the binary, recorded in the first log line.
    /// - module_name: the module the tracer was created from.
    pub fn new(options: TracerOptions, service_name: &str, module_name: &str) -> Self {
        let log_filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(options.default_directives));

        let stdout_tracer = if options.compact {
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stdout)
                .compact()
                .boxed()
        } else {
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stdout)
                .boxed()
        };

        let subscriber =
            tracing_subscriber::Registry::default().with(stdout_tracer.with_filter(log_filter));

        //  This is only called once, so will never panic
        tracing::subscriber::set_global_default(subscriber)
            .expect("tracing::subscriber::set_global_default should only be called once");

        tracing::debug!("Tracer initialised for {service_name} in {module_name}");
        Self {
            service_name: service_name.to_owned(),
        }
    }

    pub fn service_name(&self) -> &str {
        &self.service_name
    }
}

/// Should be called at the start of each component.
#[macro_export]
macro_rules! init_tracer {
    ($options:expr) => {{ $crate::TracerEngine::new($options, env!("CARGO_BIN_NAME"), module_path!()) }};
}
