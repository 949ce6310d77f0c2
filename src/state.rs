// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
/*!
Scoped render state for the flip pass.

Stateful devices (the GL family, and the software backend that imitates them) keep one
global pipeline state. The flip pass needs blending, depth and culling off and a
viewport covering the whole frame, and the rest of the renderer must never notice.

[`StateScope`] applies a state and puts the old one back on drop, so restoration happens
on every exit path: normal return, `?`, or unwinding.

Backends built on immutable pipeline objects (wgpu) have nothing to restore and don't use
this module.
*/

use std::ops::{Deref, DerefMut};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Viewport {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ColorMask {
    pub r: bool,
    pub g: bool,
    pub b: bool,
    pub a: bool,
}

impl ColorMask {
    pub const ALL: ColorMask = ColorMask {
        r: true,
        g: true,
        b: true,
        a: true,
    };
    pub const RGB: ColorMask = ColorMask {
        r: true,
        g: true,
        b: true,
        a: false,
    };
}

/// The slice of global pipeline state the flip pass touches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GraphicsState {
    pub viewport: Viewport,
    pub blend: bool,
    pub depth_test: bool,
    pub depth_write: bool,
    pub cull: bool,
    pub color_mask: ColorMask,
}

impl GraphicsState {
    /// Typical renderer defaults for a `width × height` target.
    pub fn new(width: u32, height: u32) -> Self {
        GraphicsState {
            viewport: Viewport {
                x: 0,
                y: 0,
                width,
                height,
            },
            blend: true,
            depth_test: true,
            depth_write: true,
            cull: true,
            color_mask: ColorMask::ALL,
        }
    }

    /// State for a full-target copy blit: no blending, depth or culling; alpha is kept.
    pub fn blit(width: u32, height: u32) -> Self {
        GraphicsState {
            viewport: Viewport {
                x: 0,
                y: 0,
                width,
                height,
            },
            blend: false,
            depth_test: false,
            depth_write: false,
            cull: false,
            color_mask: ColorMask::RGB,
        }
    }
}

/// Guard that restores the previous [`GraphicsState`] when dropped.
#[derive(Debug)]
#[must_use = "state is restored as soon as the scope is dropped"]
pub struct StateScope<'a> {
    state: &'a mut GraphicsState,
    saved: GraphicsState,
}

impl<'a> StateScope<'a> {
    pub fn enter(state: &'a mut GraphicsState, scoped: GraphicsState) -> Self {
        let saved = std::mem::replace(state, scoped);
        StateScope { state, saved }
    }
}

impl Deref for StateScope<'_> {
    type Target = GraphicsState;
    fn deref(&self) -> &Self::Target {
        self.state
    }
}

impl DerefMut for StateScope<'_> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.state
    }
}

impl Drop for StateScope<'_> {
    fn drop(&mut self) {
        *self.state = self.saved;
    }
}
