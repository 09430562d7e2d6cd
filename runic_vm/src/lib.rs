//! `runic_vm`: the dispatch loop and the strongly-typed execution façades.
//!
//! The compiler produces type-erased [`runic_compiler::Container`]s; this
//! crate runs them. [`typed::Parser`] and [`worker::Worker`] bind
//! compile-time host tuples to the declared register layout, so the host
//! only ever sees typed inputs and outputs; [`blit::BlitWorker`] is the
//! per-pixel variant used by sprite rendering.

pub mod blit;
pub mod typed;
pub mod worker;

pub use blit::{BlitWorker, PixelSurface};
pub use typed::{EventsParser, InputArg, InputTuple, OutputSlot, OutputTuple, Parser, Ptr, PtrMut, Ro, TypedParser};
pub use worker::{execute_base, Worker};
