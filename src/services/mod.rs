pub mod controller;
pub mod images;
pub mod providers;
pub mod search_state;

pub use controller::{ControllerSettings, IncrementalSearchController, SearchSnapshot};
pub use search_state::{Completion, ControllerEvent};
