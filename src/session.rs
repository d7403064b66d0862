use std::path::{Path, PathBuf};

use log::info;

use crate::error::{ImportError, Result};
use crate::export::{self, ExportReport};
use crate::labels::LabelStore;
use crate::mask;
use crate::psd::PsdDocument;
use crate::settings::ExportSettings;
use crate::spatial::{self, BuildOptions, PlanNode, SceneBackend, Units};
use crate::tree::LayerTree;

/// One loaded document with its layer tree and import settings.
///
/// Everything is rebuilt from scratch when a different document is opened.
pub struct ImportSession {
    pub path: PathBuf,
    pub document: PsdDocument,
    pub tree: LayerTree,
    pub settings: ExportSettings,
}

impl ImportSession {
    pub fn open(path: &Path, store: &dyn LabelStore) -> Result<Self> {
        let document = PsdDocument::open(path)?;
        let tree = LayerTree::build(document.records().to_vec())?;

        let mut settings = ExportSettings::load(path, store)?;
        settings.load_layers(&tree, store)?;
        export::refresh(&tree, &mut settings);

        info!(
            "opened {} ({}x{})",
            path.display(),
            document.width(),
            document.height()
        );

        Ok(ImportSession {
            path: path.to_path_buf(),
            document,
            tree,
            settings,
        })
    }

    pub fn list(&self) -> Vec<String> {
        mask::list(&self.tree)
    }

    pub fn set_group_visible(&mut self, name: &str, visible: bool) -> Result<()> {
        let id = self.group_id(name)?;
        self.tree.set_group_visible(id, visible)?;
        export::refresh(&self.tree, &mut self.settings);

        Ok(())
    }

    pub fn set_group_opened(&mut self, name: &str, opened: bool) -> Result<()> {
        let id = self.group_id(name)?;
        self.tree.set_group_opened(id, opened)?;
        export::refresh(&self.tree, &mut self.settings);

        Ok(())
    }

    pub fn set_layer_visible(&mut self, index: usize, visible: bool) -> Result<()> {
        self.tree.set_layer_visible(index, visible)?;
        export::refresh(&self.tree, &mut self.settings);

        Ok(())
    }

    pub fn group_id(&self, name: &str) -> Result<usize> {
        self.tree
            .find_group(name)
            .ok_or_else(|| ImportError::UnknownGroup(name.to_string()))
    }

    pub fn build_options(&self) -> BuildOptions {
        BuildOptions::new((self.document.width(), self.document.height()))
    }

    pub fn export(&mut self, store: &mut dyn LabelStore) -> Result<ExportReport> {
        export::export(&self.document, &self.tree, &mut self.settings, store)
    }

    pub fn plan(&self, options: &BuildOptions, units: Units) -> Result<PlanNode> {
        spatial::plan(&self.tree, &self.settings, options, units)
    }

    pub fn build<B: SceneBackend>(
        &self,
        options: &BuildOptions,
        backend: &mut B,
        parent: Option<&B::Node>,
    ) -> Result<B::Node> {
        spatial::build(&self.tree, &self.settings, options, backend, parent)
    }
}
