//! Template rendering against an [`ExecutionScope`].
use crate::scope::{Dialect, ExecutionScope};
use crate::trim::{TrimMode, TrimPolicy};

/// Highest accepted safety level.
pub const MAX_SAFETY: u8 = 4;

/// Renders template source within a scope.
///
/// Implementations receive the trim mode already resolved into its parts and
/// the safety level exactly as configured; what a level means is up to the
/// renderer.
pub trait TemplateRenderer {
    fn render(
        &self,
        scope: &mut ExecutionScope,
        name: &str,
        source: &str,
        mode: &TrimMode,
        safety: Option<u8>,
    ) -> Result<String, minijinja::Error>;
}

/// The default renderer, backed by MiniJinja.
///
/// Percent lines become MiniJinja line statements, the trim policies map onto
/// `trim_blocks`/`lstrip_blocks`, and the safety level bounds the number of
/// instructions a template may execute.
#[derive(Debug, Clone, Copy, Default)]
pub struct MiniJinjaRenderer;

impl MiniJinjaRenderer {
    pub fn new() -> Self {
        Self
    }

    pub fn dialect(mode: &TrimMode, safety: Option<u8>) -> Dialect {
        let (trim_blocks, lstrip_blocks) = match mode.policy() {
            TrimPolicy::None => (false, false),
            TrimPolicy::TagNewline => (true, false),
            TrimPolicy::LineTags => (true, true),
            // `-%}` and `{%-` are always understood.
            TrimPolicy::Explicit => (false, false),
        };

        Dialect {
            line_statements: mode.percent(),
            trim_blocks,
            lstrip_blocks,
            fuel: fuel_for(safety),
        }
    }
}

impl TemplateRenderer for MiniJinjaRenderer {
    fn render(
        &self,
        scope: &mut ExecutionScope,
        name: &str,
        source: &str,
        mode: &TrimMode,
        safety: Option<u8>,
    ) -> Result<String, minijinja::Error> {
        scope.render(name, source, &Self::dialect(mode, safety))
    }
}

fn fuel_for(safety: Option<u8>) -> Option<u64> {
    match safety? {
        0 => None,
        1 => Some(1_000_000),
        2 => Some(100_000),
        3 => Some(10_000),
        _ => Some(1_000),
    }
}
