//! Internal tunes every section carries.
//!
//! They only describe menu entries. Activation is handled by whatever menu
//! UI hosts the editor, through the manager's move and remove operations.

use std::sync::Arc;

use super::{BlockTune, MenuItem, TuneContext, TuneFactory, TuneRender};
use crate::surface::Surface;

macro_rules! internal_tune {
    ($tune:ident, $factory:ident, $name:literal, $title:literal, $icon:literal) => {
        /// Internal menu tune.
        #[derive(Debug)]
        pub struct $tune;

        impl BlockTune for $tune {
            fn render(&self, _surface: &mut Surface) -> TuneRender {
                TuneRender::Items(vec![MenuItem::new($name, $title).with_icon($icon)])
            }
        }

        #[derive(Debug, Default)]
        pub struct $factory;

        impl TuneFactory for $factory {
            fn create(&self, _ctx: TuneContext) -> anyhow::Result<Arc<dyn BlockTune>> {
                Ok(Arc::new($tune))
            }

            fn is_internal(&self) -> bool {
                true
            }
        }
    };
}

internal_tune!(MoveUpTune, MoveUpTuneFactory, "move-up", "Move up", "arrow-up");
internal_tune!(DeleteTune, DeleteTuneFactory, "delete", "Delete", "cross");
internal_tune!(MoveDownTune, MoveDownTuneFactory, "move-down", "Move down", "arrow-down");
