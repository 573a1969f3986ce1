#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::too_many_arguments)]

//! GPU resource and context management for arrays shared between a
//! rasterizer and a compute framework.
//!
//! A [`Context`] serialises every driver call on one native surface and owns
//! the [`Buffer`]s and [`Texture`]s created while it is current. Resources
//! are registered with the render API and, whenever their format allows, with
//! the compute interop layer, so [`Tensor`] data moves between the two
//! without a host round trip.

pub mod backend;
pub mod context;
pub mod dtype;
pub mod errors;
pub mod mapping;
pub mod render;
pub mod resources;
pub mod settings;
pub mod tensor;

pub use backend::headless::{HeadlessDevice, HeadlessStats};
pub use backend::{BufferTarget, BufferUsage, TextureParameters, TextureTarget};
pub use context::{BufferHandle, Context, Current, ResourceHandle, TextureHandle};
pub use dtype::{DType, GlType, ScalarType};
pub use errors::{InteropError, Result};
pub use render::{Bindable, RenderTarget, SceneDraw};
pub use resources::{Buffer, Resource, ResourceState, Texture};
pub use settings::{ContextSettings, ErrorChecks};
pub use tensor::{Device, Tensor};
