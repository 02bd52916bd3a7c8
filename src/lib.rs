//! Editing core of a layered raster image editor: pixel buffers, selection
//! masks, convolution, layered composition and an undo/redo history, with
//! tools and effects dispatched through a common `Operation` interface.

#![allow(clippy::too_many_arguments)]
#![allow(clippy::type_complexity)]

#[macro_use]
pub mod logger;
pub mod canvas;
pub mod cli;
pub mod components;
pub mod error;
pub mod events;
pub mod io;
pub mod ops;
pub mod params;
pub mod selection;
pub mod settings;
pub mod workspace;

pub use canvas::{Layer, LayerId, PixelBuffer};
pub use components::history::{EditLayerStep, EditSelectionStep, GenericStep, History, HistoryStep};
pub use error::EditError;
pub use events::{EditEvent, EventSink};
pub use selection::{SelectedArea, SelectionMode, SelectionShape};
pub use workspace::Workspace;
