//! The dispatch loop and the typed worker.
//!
//! Execution is a flat loop: read a handler handle, call the handler, let
//! it consume its own immediates and steer the program counter. Every
//! instruction counts against the worker's budget, so a runaway script
//! halts with `InstructionBudgetExceeded` instead of spinning forever.

use crate::typed::{InputTuple, OutputTuple, TypedParser};
use runic_compiler::bytecode::{Container, ContainerEvents, OpHandle};
use runic_compiler::catalog::Catalog;
use runic_core::error::RuntimeError;
use runic_core::exec::{read_u16, OpResult, ProgPos, WorkerState, DEFAULT_BUDGET};
use runic_core::REG_SLOT;
use std::marker::PhantomData;

/// Run bytecode against a worker state until a handler ends or fails it.
pub fn execute_base(
    state: &mut WorkerState,
    catalog: &Catalog,
    code: &[u8],
) -> Result<(), RuntimeError> {
    if code.is_empty() {
        return Ok(());
    }
    let mut pc = ProgPos::START;
    loop {
        if !state.step() {
            return Err(RuntimeError::InstructionBudgetExceeded {
                budget: state.budget(),
            });
        }
        let handle = OpHandle(read_u16(code, &mut pc));
        match (catalog.handler(handle))(state, code, &mut pc) {
            OpResult::Continue => {}
            OpResult::End => return Ok(()),
            OpResult::Error(e) => return Err(e),
        }
    }
}

/// A per-execution VM binding for one typed parser.
///
/// Construction zeroes the register file and writes the declared inputs at
/// their offsets. Workers are short-lived: one is built per execution batch
/// and dropped afterwards. `'h` is the lifetime of the host objects lent to
/// the run; the worker cannot outlive them.
pub struct Worker<'p, 'h, P: TypedParser> {
    parser: &'p P,
    state: WorkerState,
    _host: PhantomData<&'h ()>,
}

impl<'p, 'h, P: TypedParser> Worker<'p, 'h, P> {
    /// Create a worker with the default instruction budget.
    #[must_use]
    pub fn new(parser: &'p P, inputs: <P::Inputs as InputTuple>::Values<'h>) -> Self {
        Self::with_budget(parser, inputs, DEFAULT_BUDGET)
    }

    /// Create a worker with an explicit per-execute instruction budget.
    #[must_use]
    pub fn with_budget(
        parser: &'p P,
        inputs: <P::Inputs as InputTuple>::Values<'h>,
        budget: u64,
    ) -> Self {
        let mut state = WorkerState::with_budget(budget);
        let base_offset = (<P::Output as OutputTuple>::COUNT * REG_SLOT) as u16;
        // SAFETY: the bound host references live for 'h and this worker
        // cannot outlive 'h; the state never leaves the worker.
        unsafe { <P::Inputs as InputTuple>::bind(inputs, &mut state, base_offset) };
        Self {
            parser,
            state,
            _host: PhantomData,
        }
    }

    fn run(&mut self, code: &[u8]) -> Result<(), RuntimeError> {
        self.state.restart_budget();
        execute_base(&mut self.state, self.parser.base().catalog(), code)
    }

    /// Execute one script: copy caller outputs in, run, copy writable
    /// outputs back.
    pub fn execute(
        &mut self,
        container: &Container,
        out: &mut <P::Output as OutputTuple>::Values,
    ) -> Result<(), RuntimeError> {
        debug_assert_eq!(
            container.parser_id(),
            self.parser.base().id(),
            "container executed against a foreign parser"
        );
        <P::Output as OutputTuple>::set(&mut self.state.regs, out);
        if container.is_active() {
            self.run(container.code())?;
        }
        <P::Output as OutputTuple>::get(&self.state.regs, out);
        Ok(())
    }

    /// Execute a script with its event chains: before-events, main script,
    /// after-events, restoring the read-only output slots before each run.
    pub fn execute_events(
        &mut self,
        container: &ContainerEvents,
        out: &mut <P::Output as OutputTuple>::Values,
    ) -> Result<(), RuntimeError> {
        <P::Output as OutputTuple>::set(&mut self.state.regs, out);
        for event in container.before() {
            <P::Output as OutputTuple>::reset_readonly(&mut self.state.regs, out);
            self.run(event.code())?;
        }
        <P::Output as OutputTuple>::reset_readonly(&mut self.state.regs, out);
        if container.current().is_active() {
            self.run(container.current().code())?;
        }
        for event in container.after() {
            <P::Output as OutputTuple>::reset_readonly(&mut self.state.regs, out);
            self.run(event.code())?;
        }
        <P::Output as OutputTuple>::get(&self.state.regs, out);
        Ok(())
    }
}
