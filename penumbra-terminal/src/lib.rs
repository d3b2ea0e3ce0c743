/// Terminal frontend for the shadow-mapped renderer
use crossterm::{
    cursor,
    event::{self, DisableMouseCapture, EnableMouseCapture, Event},
    execute, queue,
    style::{Color, Print, ResetColor, SetForegroundColor},
    terminal::{self, ClearType},
};
use nalgebra::Vector3;
use penumbra_core::geometry::{cube, floor_quad, triangle_faces};
use penumbra_core::{
    Animator, Camera, ColorPass, FrameLoop, FrameStatus, Gpu, GpuError, Light, Material,
    MaterialTable, MeshAsset, Model, ModelError, ObjError, RendererConfig, Resolution, Scene,
    SceneContext, SceneError, ShadowPass, TextureLoader,
};
use std::io::{self, stdout, Write};
use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::time::{Duration, Instant};

pub mod input;
pub mod present;
pub mod raster;
pub mod shading;
pub mod texture;

pub use input::InputMapper;
pub use present::{PresentMode, Presenter};
pub use raster::SoftwareGpu;
pub use texture::ImageTextureLoader;

/// Spin of the demo's centre piece in degrees per second.
const SPIN_DEGREES_PER_SECOND: f32 = -60.0;
/// Key summary shown in the status line.
const CONTROLS: &str =
    "WASD move  Space/C rise/sink  Shift/R sprint  Arrows/drag look  F light  Q quit";
/// Gap between loaded models along the x axis.
const MODEL_SPACING: f32 = 2.0;

#[derive(thiserror::Error, Debug)]
pub enum SetupError {
    #[error(transparent)]
    Obj(#[from] ObjError),
    #[error(transparent)]
    Model(#[from] ModelError),
    #[error(transparent)]
    Scene(#[from] SceneError),
    #[error(transparent)]
    Gpu(#[from] GpuError),
}

/// What to put in the scene and how to show it.
#[derive(Debug, Clone)]
pub struct AppOptions {
    pub models: Vec<PathBuf>,
    pub scale: f32,
    pub present_mode: PresentMode,
    pub target_fps: u32,
}

impl Default for AppOptions {
    fn default() -> Self {
        Self {
            models: Vec::new(),
            scale: 1.0,
            present_mode: PresentMode::HalfBlock,
            target_fps: 30,
        }
    }
}

/// Build the scene: the floor, an opaque spinning crate, any models given on
/// the command line in a row behind it, and a translucent pane last.
pub fn build_scene(
    gpu: &Rc<dyn Gpu>,
    options: &AppOptions,
    textures: &mut impl TextureLoader,
) -> Result<(Scene, Animator), SetupError> {
    let mut scene = Scene::new();
    let mut animator = Animator::new();

    let mut floor = Model::from_vertices(gpu, &floor_quad(1.0))?;
    floor.translate(Vector3::new(0.0, -1.2, 0.0));
    floor.scale(Vector3::new(100.0, 0.1, 100.0));
    scene.add("floor", floor)?;

    let mut crate_model = Model::from_vertices(gpu, &cube(1.0, [0.8, 0.55, 0.3, 1.0]))?;
    crate_model.translate(Vector3::new(0.0, -0.8, -4.0));
    let spinner = scene.add("crate", crate_model)?;
    animator.spin(spinner, Vector3::y(), SPIN_DEGREES_PER_SECOND.to_radians());

    let offset = (options.models.len() as f32 - 1.0) * MODEL_SPACING / 2.0;
    for (index, path) in options.models.iter().enumerate() {
        let search_dir = path.parent().unwrap_or_else(|| Path::new("."));
        let asset = MeshAsset::load(path, options.scale, search_dir)?;
        let mut model = Model::from_asset(gpu, asset, textures)?;
        model.translate(Vector3::new(index as f32 * MODEL_SPACING - offset, -0.5, -7.0));

        let stem = path.file_stem().map(|s| s.to_string_lossy().into_owned()).unwrap_or_default();
        let name = match scene.lookup(&stem) {
            Ok(_) => format!("{}-{}", stem, index),
            Err(_) => stem,
        };
        scene.add(name, model)?;
    }

    scene.add("pane", Model::from_asset(gpu, glass_pane()?, textures)?)?;

    log::info!("Scene ready with {} objects", scene.len());
    Ok((scene, animator))
}

/// A thin translucent slab between the camera and the crate.
fn glass_pane() -> Result<MeshAsset, ObjError> {
    let glass = Material::new("glass", [0.35, 0.6, 0.95], 0.4);
    let colour = glass.vertex_colour();

    let mut vertices = cube(1.0, colour);
    for vertex in &mut vertices {
        vertex.position[0] = vertex.position[0] * 1.5 + 1.2;
        vertex.position[1] = vertex.position[1] * 1.2 - 0.6;
        vertex.position[2] = vertex.position[2] * 0.05 - 2.5;
    }

    let faces = triangle_faces(vertices.len())
        .into_iter()
        .map(|mut face| {
            face.material = Some(0);
            face
        })
        .collect();
    MeshAsset::from_parts(vertices, faces, MaterialTable::new(vec![glass]))
}

/// Pixel size of the frame for a terminal, capped at `limit`. The height
/// stays even so every cell row covers two pixel rows.
fn frame_resolution(
    presenter: &Presenter,
    limit: Resolution,
    columns: u16,
    rows: u16,
) -> Resolution {
    let (width, height) = presenter.frame_size(columns, rows);
    let fitted = Resolution::new(width, height).fit_within(limit);
    Resolution::new(fitted.width.max(1), (fitted.height & !1).max(2))
}

/// Main application struct for terminal 3D rendering
pub struct TerminalApp {
    gpu: Rc<SoftwareGpu>,
    frame_loop: FrameLoop,
    presenter: Presenter,
    screen_limit: Resolution,
    input: InputMapper,
    target_fps: u32,
    running: bool,
    last_frame: Instant,
    frame_count: u32,
    fps: f32,
}

impl TerminalApp {
    /// Set up the device, scene and passes for a terminal of `columns x rows`.
    pub fn new(
        config: &RendererConfig,
        options: &AppOptions,
        (columns, rows): (u16, u16),
    ) -> Result<Self, SetupError> {
        let presenter = Presenter::new(options.present_mode, 1);
        let resolution = frame_resolution(&presenter, config.screen, columns, rows);

        let software = Rc::new(SoftwareGpu::new(resolution.width, resolution.height));
        let gpu: Rc<dyn Gpu> = software.clone();

        let (scene, animator) = build_scene(&gpu, options, &mut ImageTextureLoader::new())?;
        let shadow_pass = ShadowPass::new(&gpu, shading::DEPTH_PROGRAM, config.shadow)?;
        let color_pass =
            ColorPass::new(&gpu, shading::SHADED_PROGRAM, resolution, config.clear_colour);
        let context = SceneContext::new(
            Camera::new(config.camera.clone()),
            Light::from_config(&config.light),
        );
        let frame_loop = FrameLoop::new(&gpu, scene, context, shadow_pass, color_pass, config)
            .with_animator(animator);

        Ok(Self {
            gpu: software,
            frame_loop,
            presenter,
            screen_limit: config.screen,
            input: InputMapper::new(),
            target_fps: options.target_fps.max(1),
            running: true,
            last_frame: Instant::now(),
            frame_count: 0,
            fps: 0.0,
        })
    }

    pub fn run(&mut self) -> io::Result<()> {
        terminal::enable_raw_mode()?;
        execute!(stdout(), terminal::EnterAlternateScreen, EnableMouseCapture, cursor::Hide)?;

        let result = self.main_loop();

        // Cleanup
        terminal::disable_raw_mode()?;
        execute!(stdout(), DisableMouseCapture, terminal::LeaveAlternateScreen, cursor::Show)?;

        result
    }

    fn main_loop(&mut self) -> io::Result<()> {
        let target_frame_time = Duration::from_secs_f32(1.0 / self.target_fps as f32);
        let mut previous = Instant::now();

        while self.running {
            let frame_start = Instant::now();

            // Handle input
            while event::poll(Duration::from_millis(0))? {
                self.handle_event(&event::read()?, &mut stdout())?;
            }

            // Update and render
            let dt = (frame_start - previous).as_secs_f32();
            previous = frame_start;
            self.step(dt)?;

            // Frame timing
            self.frame_count += 1;
            let elapsed = frame_start.elapsed();
            if elapsed < target_frame_time {
                std::thread::sleep(target_frame_time - elapsed);
            }

            // Update FPS counter
            let now = Instant::now();
            if (now - self.last_frame).as_secs() >= 1 {
                self.fps = self.frame_count as f32 / (now - self.last_frame).as_secs_f32();
                self.frame_count = 0;
                self.last_frame = now;
            }
        }

        Ok(())
    }

    fn handle_event<W: Write>(&mut self, event: &Event, out: &mut W) -> io::Result<()> {
        if let Event::Resize(columns, rows) = *event {
            let resolution = frame_resolution(&self.presenter, self.screen_limit, columns, rows);
            self.frame_loop.color_pass_mut().resize(resolution);
            // stale cells outside the new frame would otherwise linger
            queue!(out, terminal::Clear(ClearType::All))?;
        }
        self.input.handle(event);
        Ok(())
    }

    fn step(&mut self, dt: f32) -> io::Result<()> {
        let input = self.input.take();
        let status = self
            .frame_loop
            .advance(&input, dt)
            .map_err(|error| io::Error::new(io::ErrorKind::Other, error))?;

        if status == FrameStatus::Closed {
            self.running = false;
            return Ok(());
        }
        self.render()
    }

    fn render(&mut self) -> io::Result<()> {
        let Some(frame) = self.gpu.frame() else {
            return Ok(());
        };

        let mut stdout = stdout();
        self.presenter.draw(&frame, &mut stdout)?;

        // Draw UI overlay
        let position = self.frame_loop.context().camera.position();
        queue!(
            stdout,
            cursor::MoveTo(0, 0),
            terminal::Clear(ClearType::CurrentLine),
            SetForegroundColor(Color::Yellow),
            Print(format!(
                "Penumbra | FPS: {:.1} | ({:.1}, {:.1}, {:.1}) | {}",
                self.fps, position.x, position.y, position.z, CONTROLS
            )),
            ResetColor
        )?;

        stdout.flush()?;
        Ok(())
    }

    pub fn frame_loop(&self) -> &FrameLoop {
        &self.frame_loop
    }

    pub fn gpu(&self) -> &SoftwareGpu {
        &self.gpu
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossterm::event::{KeyCode, KeyEvent};
    use penumbra_core::{FrameInput, TextureError, TextureImage};

    fn no_textures(path: &Path) -> Result<TextureImage, TextureError> {
        Err(TextureError::Read {
            path: path.display().to_string(),
            reason: "not needed".to_string(),
        })
    }

    #[test]
    fn test_demo_scene_orders_pane_last() {
        let software = Rc::new(SoftwareGpu::new(16, 16));
        let gpu: Rc<dyn Gpu> = software.clone();

        let (scene, animator) =
            build_scene(&gpu, &AppOptions::default(), &mut no_textures).unwrap();

        let names: Vec<_> = scene.draw_order().iter().map(|id| scene.name(*id).unwrap()).collect();
        assert_eq!(names, vec!["floor", "crate", "pane"]);
        assert_eq!(animator.spins().len(), 1);
        assert_eq!(animator.spins()[0].object, scene.lookup("crate").unwrap());
    }

    #[test]
    fn test_missing_model_fails_setup() {
        let software = Rc::new(SoftwareGpu::new(16, 16));
        let gpu: Rc<dyn Gpu> = software.clone();
        let options = AppOptions {
            models: vec![PathBuf::from("/nonexistent/penumbra/model.obj")],
            ..Default::default()
        };

        assert!(matches!(
            build_scene(&gpu, &options, &mut no_textures),
            Err(SetupError::Obj(ObjError::Io { .. }))
        ));
    }

    #[test]
    fn test_frame_renders_and_presents() {
        let config = RendererConfig {
            shadow: Resolution::new(128, 128),
            clear_colour: [1.0, 0.0, 0.5, 1.0],
            ..Default::default()
        };
        let mut app = TerminalApp::new(&config, &AppOptions::default(), (40, 13)).unwrap();

        app.step(1.0 / 30.0).unwrap();
        assert!(app.running);

        let frame = app.gpu().frame().unwrap();
        assert_eq!((frame.width(), frame.height()), (40, 24));

        // top row looks over the floor into the clear colour
        assert_eq!(frame.rgb8(0, 0), (255, 0, 128));
        // floor or crate fills the bottom row
        assert_ne!(frame.rgb8(20, 23), (255, 0, 128));
    }

    #[test]
    fn test_frame_resolution_capped_by_screen() {
        let presenter = Presenter::new(PresentMode::HalfBlock, 1);
        let roomy = Resolution::new(1920, 1080);

        assert_eq!(frame_resolution(&presenter, roomy, 80, 25), Resolution::new(80, 48));
        assert_eq!(
            frame_resolution(&presenter, Resolution::new(64, 33), 80, 25),
            Resolution::new(64, 32)
        );
        assert_eq!(
            frame_resolution(&presenter, Resolution::new(1, 1), 80, 25),
            Resolution::new(1, 2)
        );
    }

    #[test]
    fn test_screen_limit_sizes_frame() {
        let config = RendererConfig {
            screen: Resolution::new(20, 10),
            shadow: Resolution::new(64, 64),
            ..Default::default()
        };
        let mut app = TerminalApp::new(&config, &AppOptions::default(), (40, 13)).unwrap();
        app.step(1.0 / 30.0).unwrap();

        let frame = app.gpu().frame().unwrap();
        assert_eq!((frame.width(), frame.height()), (20, 10));
    }

    struct BrokenTerminal;

    impl Write for BrokenTerminal {
        fn write(&mut self, _: &[u8]) -> io::Result<usize> {
            Err(io::Error::new(io::ErrorKind::BrokenPipe, "terminal gone"))
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_resize_resizes_color_pass() {
        let config = RendererConfig {
            shadow: Resolution::new(64, 64),
            ..Default::default()
        };
        let mut app = TerminalApp::new(&config, &AppOptions::default(), (40, 13)).unwrap();

        let mut out = Vec::new();
        app.handle_event(&Event::Resize(30, 9), &mut out).unwrap();

        assert!(!out.is_empty());
        app.step(0.01).unwrap();
        let frame = app.gpu().frame().unwrap();
        assert_eq!((frame.width(), frame.height()), (30, 16));
    }

    #[test]
    fn test_resize_write_failure_propagates() {
        let config = RendererConfig {
            shadow: Resolution::new(64, 64),
            ..Default::default()
        };
        let mut app = TerminalApp::new(&config, &AppOptions::default(), (40, 13)).unwrap();

        let error = app.handle_event(&Event::Resize(30, 9), &mut BrokenTerminal).unwrap_err();
        assert_eq!(error.kind(), io::ErrorKind::BrokenPipe);
    }

    #[test]
    fn test_quit_stops_app() {
        let config = RendererConfig {
            shadow: Resolution::new(64, 64),
            ..Default::default()
        };
        let mut app = TerminalApp::new(&config, &AppOptions::default(), (20, 8)).unwrap();
        app.frame_loop.advance(&FrameInput::default(), 0.0).unwrap();

        app.input.handle(&Event::Key(KeyEvent::from(KeyCode::Esc)));
        app.step(0.01).unwrap();
        assert!(!app.running);
        assert_eq!(app.frame_loop().frames(), 1);
    }
}
