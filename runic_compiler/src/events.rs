//! The events layer: priority-ordered script chains around a main script.
//!
//! Hosts register named event scripts with priorities in
//! [−`PRIORITY_LIMIT`, +`PRIORITY_LIMIT`]. At freeze time the events are
//! stably sorted by their pre-scaled priority and split at zero into a
//! before-run and an after-run; every script parsed afterwards carries
//! shared references to both chains.

use crate::bytecode::{Container, ContainerEvents};
use crate::parser::ScriptParserBase;
use runic_core::error::{CompileError, ConfigError};
use runic_core::global::ScriptGlobal;
use std::sync::Arc;
use thiserror::Error;

/// Scale applied to user priorities; the sub-priority range keeps the
/// stable sort's insertion order observable.
pub const OFFSET_SCALE: i32 = 100;

/// Inclusive bound on user-facing event priorities.
pub const PRIORITY_LIMIT: i32 = 100;

/// Failure while registering an event script.
#[derive(Error, Debug)]
pub enum EventError {
    /// The event script failed to compile.
    #[error(transparent)]
    Compile(#[from] CompileError),
    /// The registration itself was invalid.
    #[error(transparent)]
    Config(#[from] ConfigError),
    /// The parser was already frozen.
    #[error("events already frozen")]
    Frozen,
}

struct EventData {
    offset: i32,
    container: Container,
}

/// Parser for a script kind with event chains.
pub struct ScriptParserEvents {
    base: ScriptParserBase,
    events: Vec<EventData>,
    frozen: Option<(Arc<[Container]>, Arc<[Container]>)>,
}

impl ScriptParserEvents {
    /// Create an events parser.
    #[must_use]
    pub fn new(global: &mut ScriptGlobal, name: &str) -> Self {
        Self {
            base: ScriptParserBase::new(global, name),
            events: Vec::new(),
            frozen: None,
        }
    }

    /// The underlying parser declaration.
    #[must_use]
    pub fn base(&self) -> &ScriptParserBase {
        &self.base
    }

    /// Mutable access for declaration-phase registration.
    pub fn base_mut(&mut self) -> &mut ScriptParserBase {
        &mut self.base
    }

    /// Register one event script with a priority.
    ///
    /// Negative priorities run before the main script, non-negative after.
    /// Events with equal priorities keep registration order.
    pub fn add_event(
        &mut self,
        global: &ScriptGlobal,
        name: &str,
        code: &str,
        priority: i32,
    ) -> Result<(), EventError> {
        if self.frozen.is_some() {
            return Err(EventError::Frozen);
        }
        if priority.abs() > PRIORITY_LIMIT {
            return Err(ConfigError::PriorityOutOfRange {
                priority,
                limit: PRIORITY_LIMIT,
            }
            .into());
        }
        let container = self.base.parse(global, name, code)?;
        self.events.push(EventData {
            offset: priority * OFFSET_SCALE,
            container,
        });
        Ok(())
    }

    /// Sort and split the event chains. Idempotent.
    pub fn freeze(&mut self) {
        if self.frozen.is_some() {
            return;
        }
        let mut events = std::mem::take(&mut self.events);
        events.sort_by_key(|e| e.offset);
        let split = events.partition_point(|e| e.offset < 0);
        let after = events.split_off(split);
        let before: Vec<Container> = events.into_iter().map(|e| e.container).collect();
        let after: Vec<Container> = after.into_iter().map(|e| e.container).collect();
        tracing::debug!(
            kind = self.base.name(),
            before = before.len(),
            after = after.len(),
            "event chains frozen"
        );
        self.frozen = Some((Arc::from(before), Arc::from(after)));
    }

    fn chains(&self) -> (Arc<[Container]>, Arc<[Container]>) {
        let (before, after) = self
            .frozen
            .as_ref()
            .expect("events parser must be frozen before parsing scripts");
        (before.clone(), after.clone())
    }

    /// Compile a main script, attaching the frozen event chains.
    pub fn parse_events(
        &self,
        global: &ScriptGlobal,
        parent: &str,
        code: &str,
    ) -> Result<ContainerEvents, CompileError> {
        let current = self.base.parse(global, parent, code)?;
        let (before, after) = self.chains();
        Ok(ContainerEvents::new(current, before, after))
    }

    /// Compile a main script with default-script fallback, attaching the
    /// frozen event chains.
    #[must_use]
    pub fn parse_events_with_default(
        &self,
        global: &ScriptGlobal,
        parent: &str,
        code: &str,
    ) -> ContainerEvents {
        let current = self.base.parse_with_default(global, parent, code);
        let (before, after) = self.chains();
        ContainerEvents::new(current, before, after)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use runic_core::argkind::{ArgFlags, ArgKind, BaseType};

    fn events_parser(global: &mut ScriptGlobal) -> ScriptParserEvents {
        let mut parser = ScriptParserEvents::new(global, "hooked");
        parser
            .base_mut()
            .add_output("out", BaseType::INT, true)
            .unwrap();
        parser
            .base_mut()
            .add_input("a", ArgKind::new(BaseType::INT, ArgFlags::REG))
            .unwrap();
        parser
    }

    #[test]
    fn test_priority_range_enforced() {
        let mut global = ScriptGlobal::new();
        let mut parser = events_parser(&mut global);
        let err = parser
            .add_event(&global, "late", "return a;", 101)
            .unwrap_err();
        assert!(matches!(
            err,
            EventError::Config(ConfigError::PriorityOutOfRange { .. })
        ));
    }

    #[test]
    fn test_freeze_splits_at_zero() {
        let mut global = ScriptGlobal::new();
        let mut parser = events_parser(&mut global);
        parser.add_event(&global, "post", "return a;", 100).unwrap();
        parser.add_event(&global, "mid", "return a;", 0).unwrap();
        parser.add_event(&global, "pre", "return a;", -100).unwrap();
        parser.freeze();

        let c = parser.parse_events(&global, "main", "return a;").unwrap();
        assert_eq!(c.before().len(), 1);
        assert_eq!(c.after().len(), 2);
    }

    #[test]
    fn test_chains_are_shared() {
        let mut global = ScriptGlobal::new();
        let mut parser = events_parser(&mut global);
        parser.add_event(&global, "pre", "return a;", -5).unwrap();
        parser.freeze();

        let c1 = parser.parse_events(&global, "one", "return a;").unwrap();
        let c2 = parser.parse_events(&global, "two", "return a;").unwrap();
        assert_eq!(c1.before().as_ptr(), c2.before().as_ptr());
    }

    #[test]
    fn test_add_after_freeze_rejected() {
        let mut global = ScriptGlobal::new();
        let mut parser = events_parser(&mut global);
        parser.freeze();
        assert!(matches!(
            parser.add_event(&global, "late", "return a;", 0),
            Err(EventError::Frozen)
        ));
    }

    #[test]
    fn test_bad_event_script_is_compile_error() {
        let mut global = ScriptGlobal::new();
        let mut parser = events_parser(&mut global);
        assert!(matches!(
            parser.add_event(&global, "bad", "nonsense here;", 0),
            Err(EventError::Compile(_))
        ));
    }
}
