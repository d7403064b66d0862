use std::path::Path;

use gdnative::api::{Control, Image, ImageTexture, Node2D, Sprite, TextureRect};
use gdnative::prelude::*;

use crate::labels::SidecarLabels;
use crate::session::ImportSession;
use crate::spatial::{SceneBackend, Units, Vec2, Visual};

const TEXTURE_FLAGS: i64 = 7;

#[derive(NativeClass)]
#[inherit(Reference)]
pub struct PsdImporter(Option<ImportSession>);

#[methods]
impl PsdImporter {
    fn new(_base: &Reference) -> Self {
        PsdImporter(None)
    }

    #[method]
    fn load(&mut self, path: String) -> bool {
        match ImportSession::open(Path::new(&path), &SidecarLabels) {
            Ok(session) => {
                self.0 = Some(session);
                true
            }
            Err(error) => {
                godot_error!("[PSD] Loading {path} failed: {error}");
                self.0 = None;
                false
            }
        }
    }

    #[method]
    fn print_tree(&mut self) {
        if let Some(session) = self.session("print all the layers and groups") {
            godot_print!("{}", session.list().join("\n"))
        }
    }

    #[method]
    fn set_group_visible(&mut self, name: String, visible: bool) -> bool {
        let Some(session) = self.session("show or hide a group") else {
            return false;
        };

        report(session.set_group_visible(&name, visible))
    }

    #[method]
    fn set_group_opened(&mut self, name: String, opened: bool) -> bool {
        let Some(session) = self.session("fold or unfold a group") else {
            return false;
        };

        report(session.set_group_opened(&name, opened))
    }

    #[method]
    fn set_layer_visible(&mut self, index: i64, visible: bool) -> bool {
        let Some(session) = self.session("show or hide a layer") else {
            return false;
        };
        let Ok(index) = usize::try_from(index) else {
            godot_error!("[PSD] {index} is not a layer index");
            return false;
        };

        report(session.set_layer_visible(index, visible))
    }

    /// Exports the visible layers, returns how many sprites were written.
    #[method]
    fn export(&mut self) -> i64 {
        let Some(session) = self.session("export layers") else {
            return 0;
        };

        match session.export(&mut SidecarLabels) {
            Ok(exported) => exported.sprites.len() as i64,
            Err(error) => {
                godot_error!("[PSD] Export failed: {error}");
                0
            }
        }
    }

    #[method]
    fn build_sprites(&mut self, root: Ref<Node>) -> bool {
        self.build(root, &mut GodotSprites)
    }

    #[method]
    fn build_ui(&mut self, root: Ref<Node>) -> bool {
        self.build(root, &mut GodotUi)
    }
}

impl PsdImporter {
    fn session(&mut self, action: &str) -> Option<&mut ImportSession> {
        if self.0.is_none() {
            godot_error!("[PSD] You tried to {action}, but you didn't load a PSD file (succesfully) yet.");
        }

        self.0.as_mut()
    }

    fn build<B: SceneBackend<Node = Ref<Node>>>(&mut self, root: Ref<Node>, backend: &mut B) -> bool {
        let Some(session) = self.session("build a scene") else {
            return false;
        };

        if let Err(error) = session.export(&mut SidecarLabels) {
            godot_error!("[PSD] Export failed: {error}");
            return false;
        }

        let options = session.build_options();
        report(session.build(&options, backend, Some(&root)).map(|_| ()))
    }
}

fn report(result: crate::Result<()>) -> bool {
    match result {
        Ok(()) => true,
        Err(error) => {
            godot_error!("[PSD] {error}");
            false
        }
    }
}

fn load_texture(path: &Path) -> Option<Ref<ImageTexture, Unique>> {
    let image = Image::new();
    if let Err(error) = image.load(path.to_str()?) {
        godot_error!("[PSD] Could not load {}: {error:?}", path.display());
        return None;
    }

    let texture = ImageTexture::new();
    texture.create_from_image(image, TEXTURE_FLAGS);

    Some(texture)
}

// Godot 2D is measured in pixels with y pointing down.
fn godot_position(local: Vec2) -> Vector2 {
    Vector2::new(local.x, -local.y)
}

// Top left corner of a visual relative to its pivot.
fn godot_offset(visual: &Visual) -> Vector2 {
    Vector2::new(
        -visual.size.x * visual.pivot.0,
        -visual.size.y * (1.0 - visual.pivot.1),
    )
}

fn attach<T: GodotObject<Memory = ManuallyManaged> + SubClass<Node>>(
    parent: Option<&Ref<Node>>,
    node: Ref<T, Unique>,
) -> Ref<Node> {
    let node = node.into_shared().upcast::<Node>();

    if let Some(parent) = parent {
        unsafe { parent.assume_safe() }.add_child(node.clone(), false);
    }

    node
}

/// `Node2D` groups and `Sprite` layers.
pub struct GodotSprites;

impl SceneBackend for GodotSprites {
    type Node = Ref<Node>;

    fn units(&self) -> Units {
        Units::Ui
    }

    fn create_node(&mut self, parent: Option<&Ref<Node>>, name: &str, local: Vec2) -> Ref<Node> {
        let node = Node2D::new();
        node.set_name(name);
        node.set_position(godot_position(local));

        attach(parent, node)
    }

    fn attach_visual(&mut self, node: &Ref<Node>, visual: &Visual) {
        let Some(texture) = load_texture(&visual.sprite) else {
            return;
        };

        let sprite = Sprite::new();
        sprite.set_texture(texture);
        sprite.set_centered(false);
        sprite.set_offset(godot_offset(visual));
        sprite.set_z_index(i64::from(visual.sorting_order));

        attach(Some(node), sprite);
    }
}

/// `Control` groups and `TextureRect` layers.
pub struct GodotUi;

impl SceneBackend for GodotUi {
    type Node = Ref<Node>;

    fn units(&self) -> Units {
        Units::Ui
    }

    fn create_node(&mut self, parent: Option<&Ref<Node>>, name: &str, local: Vec2) -> Ref<Node> {
        let node = Control::new();
        node.set_name(name);
        node.set_position(godot_position(local), false);

        attach(parent, node)
    }

    fn attach_visual(&mut self, node: &Ref<Node>, visual: &Visual) {
        let Some(texture) = load_texture(&visual.sprite) else {
            return;
        };

        let rect = TextureRect::new();
        rect.set_texture(texture);
        rect.set_expand(true);
        rect.set_position(godot_offset(visual), false);
        rect.set_size(Vector2::new(visual.size.x, visual.size.y), false);

        attach(Some(node), rect);
    }
}

fn init(handle: InitHandle) {
    handle.add_class::<PsdImporter>();
}

godot_init!(init);
