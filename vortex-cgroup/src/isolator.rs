//! Isolator translation
//!
//! Turns resource limits into the unit options the process supervisor
//! applies to each service. The supervisor is what writes the cgroup files;
//! we only decide which options it gets.

use std::fmt;
use tracing::{debug, warn};
use vortex_core::resources::MAX_MILLI_VALUE;
use vortex_core::{Error, Quantity, ResourceLimits, Result};

use crate::backend::MountBackend;
use crate::manager::CgroupManager;

/// Kind of resource an isolator limits
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IsolatorKind {
    /// CPU bandwidth
    Cpu,
    /// Memory usage
    Memory,
}

impl IsolatorKind {
    /// Kernel controller backing this isolator
    #[must_use]
    pub const fn controller(self) -> &'static str {
        match self {
            Self::Cpu => "cpu",
            Self::Memory => "memory",
        }
    }
}

impl fmt::Display for IsolatorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.controller())
    }
}

/// A resource limit to enforce on a service
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Isolator {
    /// CPU limit in cores, usually written in millicores
    Cpu(Quantity),
    /// Memory limit in bytes
    Memory(Quantity),
}

impl Isolator {
    /// Pair a kind with its limit
    #[must_use]
    pub const fn new(kind: IsolatorKind, limit: Quantity) -> Self {
        match kind {
            IsolatorKind::Cpu => Self::Cpu(limit),
            IsolatorKind::Memory => Self::Memory(limit),
        }
    }

    /// The isolator's kind
    #[must_use]
    pub const fn kind(&self) -> IsolatorKind {
        match self {
            Self::Cpu(_) => IsolatorKind::Cpu,
            Self::Memory(_) => IsolatorKind::Memory,
        }
    }

    /// Supervisor options implementing this isolator
    ///
    /// CPU becomes `CPUQuota=<percent>%` where 1000 millicores is 100%;
    /// memory becomes `MemoryLimit=<bytes>`.
    ///
    /// # Errors
    /// Returns [`Error::LimitOutOfRange`] for negative limits, CPU limits
    /// above [`MAX_MILLI_VALUE`] cores and memory limits above `i64::MAX`
    pub fn translate(&self) -> Result<Vec<UnitOption>> {
        let out_of_range = |limit: &Quantity| Error::LimitOutOfRange {
            kind: self.kind().controller(),
            quantity: limit.to_string(),
        };

        match self {
            Self::Cpu(limit) => {
                if limit.is_negative() || limit.value() > i128::from(MAX_MILLI_VALUE) {
                    return Err(out_of_range(limit));
                }
                let quota = format!("{}%", limit.milli_value() / 10);
                Ok(vec![UnitOption::service("CPUQuota", quota)])
            }
            Self::Memory(limit) => {
                if limit.is_negative() || limit.value() > i128::from(i64::MAX) {
                    return Err(out_of_range(limit));
                }
                Ok(vec![UnitOption::service(
                    "MemoryLimit",
                    limit.value().to_string(),
                )])
            }
        }
    }
}

/// One supervisor unit-file option
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnitOption {
    /// Unit file section, e.g. `Service`
    pub section: String,
    /// Option name
    pub name: String,
    /// Option value
    pub value: String,
}

impl UnitOption {
    /// Create an option
    pub fn new(
        section: impl Into<String>,
        name: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        Self {
            section: section.into(),
            name: name.into(),
            value: value.into(),
        }
    }

    /// Create an option in the `[Service]` section
    pub fn service(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self::new("Service", name, value)
    }
}

impl fmt::Display for UnitOption {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}={}", self.section, self.name, self.value)
    }
}

/// Render options as unit-file text, grouped by section in first-seen order
#[must_use]
pub fn serialize_unit_options(opts: &[UnitOption]) -> String {
    let mut sections: Vec<&str> = Vec::new();
    for opt in opts {
        if !sections.contains(&opt.section.as_str()) {
            sections.push(&opt.section);
        }
    }

    let mut out = String::new();
    for (i, section) in sections.iter().enumerate() {
        if i > 0 {
            out.push('\n');
        }
        out.push_str(&format!("[{section}]\n"));
        for opt in opts.iter().filter(|o| o.section == *section) {
            out.push_str(&format!("{}={}\n", opt.name, opt.value));
        }
    }
    out
}

impl<B: MountBackend> CgroupManager<B> {
    /// Extend `opts` with the options for an isolator, if it can be enforced
    ///
    /// A missing limit leaves `opts` untouched. So does a kind whose
    /// controller the kernel lacks: that only logs a warning, letting a
    /// container ask for isolation the host cannot provide.
    ///
    /// # Errors
    /// Returns an error if `/proc/cgroups` cannot be read or the limit does
    /// not translate
    pub fn maybe_add_isolator(
        &self,
        mut opts: Vec<UnitOption>,
        kind: IsolatorKind,
        limit: Option<&Quantity>,
    ) -> Result<Vec<UnitOption>> {
        let Some(limit) = limit else {
            return Ok(opts);
        };

        if !self.is_isolator_supported(kind.controller())? {
            warn!(
                isolator = %kind,
                "resource/{kind} isolator set but support disabled in the kernel, skipping"
            );
            return Ok(opts);
        }

        let added = Isolator::new(kind, limit.clone()).translate()?;
        debug!(isolator = %kind, %limit, options = added.len(), "Added isolator");
        opts.extend(added);
        Ok(opts)
    }

    /// Options for every limit in `limits` (CPU first, then memory)
    pub fn isolator_options(&self, limits: &ResourceLimits) -> Result<Vec<UnitOption>> {
        let opts = self.maybe_add_isolator(Vec::new(), IsolatorKind::Cpu, limits.cpu.as_ref())?;
        self.maybe_add_isolator(opts, IsolatorKind::Memory, limits.memory.as_ref())
    }
}
