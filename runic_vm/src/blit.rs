//! The per-pixel blit worker.
//!
//! Sprite rendering runs a script once per non-transparent source pixel,
//! with the pixel value as a writable output and the shade as a read-only
//! one. The surface machinery itself stays outside the engine; anything
//! implementing [`PixelSurface`] can be blitted.

use crate::typed::{InputTuple, OutputTuple, Parser, Ro};
use crate::worker::execute_base;
use runic_compiler::bytecode::Container;
use runic_core::error::RuntimeError;
use runic_core::exec::WorkerState;
use runic_core::REG_SLOT;
use std::marker::PhantomData;

/// The output tuple of every blit-typed parser: the pixel value (writable)
/// and the shade (read-only).
pub type BlitOutput = (i64, Ro);

/// An indexed-color surface the blit worker can read and write.
pub trait PixelSurface {
    /// Width in pixels.
    fn width(&self) -> u32;
    /// Height in pixels.
    fn height(&self) -> u32;
    /// Pixel value at a position; 0 is transparent.
    fn pixel(&self, x: u32, y: u32) -> u8;
    /// Write a pixel; out-of-bounds writes are ignored.
    fn set_pixel(&mut self, x: i32, y: i32, value: u8);
}

/// Specialized worker carrying one cached script across many blit calls.
pub struct BlitWorker<'p, 'h, I: InputTuple> {
    parser: &'p Parser<BlitOutput, I>,
    state: WorkerState,
    proc: Option<&'p Container>,
    _host: PhantomData<&'h ()>,
}

impl<'p, 'h, I: InputTuple> BlitWorker<'p, 'h, I> {
    /// Create an idle blit worker (no script cached).
    #[must_use]
    pub fn new(parser: &'p Parser<BlitOutput, I>) -> Self {
        Self {
            parser,
            state: WorkerState::new(),
            proc: None,
            _host: PhantomData,
        }
    }

    /// Cache a script and bind the per-sprite inputs. An inactive container
    /// clears the worker instead.
    pub fn update(&mut self, container: &'p Container, inputs: I::Values<'h>) {
        if !container.is_active() {
            self.clear();
            return;
        }
        self.proc = Some(container);
        self.state.reset();
        let base_offset = (<BlitOutput as OutputTuple>::COUNT * REG_SLOT) as u16;
        // SAFETY: the bound host references live for 'h and this worker
        // cannot outlive 'h.
        unsafe { I::bind(inputs, &mut self.state, base_offset) };
    }

    /// Drop the cached script; subsequent blits copy pixels unchanged.
    pub fn clear(&mut self) {
        self.proc = None;
    }

    /// Whether a script is cached.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.proc.is_some()
    }

    /// Blit `src` onto `dst` at `(x, y)`, running the cached script per
    /// non-transparent pixel. `half` draws only the right half of the
    /// source. A zero script result writes nothing.
    pub fn execute_blit(
        &mut self,
        src: &impl PixelSurface,
        dst: &mut impl PixelSurface,
        x: i32,
        y: i32,
        shade: i64,
        half: bool,
    ) -> Result<(), RuntimeError> {
        let x0 = if half { src.width() / 2 } else { 0 };
        for sy in 0..src.height() {
            for sx in x0..src.width() {
                let pixel = src.pixel(sx, sy);
                if pixel == 0 {
                    continue;
                }
                let value = match self.proc {
                    Some(container) => {
                        self.state.regs.set_i64(0, i64::from(pixel));
                        self.state.regs.set_i64(REG_SLOT as u16, shade);
                        self.state.restart_budget();
                        execute_base(
                            &mut self.state,
                            self.parser.base().catalog(),
                            container.code(),
                        )?;
                        self.state.regs.get_i64(0)
                    }
                    None => i64::from(pixel),
                };
                if value != 0 {
                    dst.set_pixel(x + sx as i32, y + sy as i32, value as u8);
                }
            }
        }
        Ok(())
    }
}
