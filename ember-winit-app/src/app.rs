use std::path::PathBuf;

use anyhow::Context;
use ash::vk;
use ember_crate_tools::{init_log::init_log, resource::EmberPath};
use ember_render_interface::config::RendererConfig;
use ember_renderer::renderer::Renderer;
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};
use winit::{
    application::ApplicationHandler,
    event::WindowEvent,
    event_loop::{ActiveEventLoop, EventLoop},
    window::{Window, WindowId},
};

pub fn panic_handler(info: &std::panic::PanicHookInfo) {
    log::error!("{}", info);
    log::logger().flush();
}

pub struct WinitApp {
    config: RendererConfig,

    renderer: Option<Renderer>,
    window: Option<Window>,

    /// 事件循环中出现的致命错误，退出循环之后返回给调用方
    fatal: Option<anyhow::Error>,
}
// 总的 main 函数
impl WinitApp {
    /// 整个程序的入口
    pub fn run(config_path: Option<PathBuf>) -> anyhow::Result<()> {
        let config_path = config_path.unwrap_or_else(EmberPath::config_path);
        let config = RendererConfig::load(&config_path);

        // 配置读取失败时也需要 logger 输出错误
        init_log(config.as_ref().map(RendererConfig::log_level_filter).unwrap_or(log::LevelFilter::Info));
        std::panic::set_hook(Box::new(panic_handler));

        let mut config = config.with_context(|| format!("loading {:?}", config_path))?;
        config.background_shader = config.background_shader.as_deref().map(EmberPath::resolve);
        log::info!("config: {:?}", config);

        tracy_client::Client::start();
        tracy_client::set_thread_name!("RenderThread");

        let event_loop = EventLoop::new()?;
        let mut app = Self {
            config,
            renderer: None,
            window: None,
            fatal: None,
        };
        event_loop.run_app(&mut app)?;

        log::info!("end run.");
        app.destroy()
    }
}
// new & init
impl WinitApp {
    /// 在 window 创建之后调用，初始化 Renderer
    fn init_after_window(&mut self, event_loop: &ActiveEventLoop) -> anyhow::Result<()> {
        let window_config = &self.config.window;
        let window_attr = Window::default_attributes()
            .with_title(window_config.title.clone())
            .with_inner_size(winit::dpi::LogicalSize::new(window_config.width, window_config.height));
        let window = event_loop.create_window(window_attr)?;

        let size = window.inner_size();
        let renderer = Renderer::new(
            &self.config,
            window.display_handle()?.as_raw(),
            window.window_handle()?.as_raw(),
            vk::Extent2D {
                width: size.width,
                height: size.height,
            },
        )?;

        self.renderer = Some(renderer);
        self.window = Some(window);
        Ok(())
    }
}
// destroy
impl WinitApp {
    fn destroy(mut self) -> anyhow::Result<()> {
        // renderer 需要在 window 之前销毁
        let destroyed = match self.renderer.take() {
            Some(renderer) => renderer.destroy(),
            None => Ok(()),
        };
        self.window = None;

        if let Some(err) = self.fatal.take() {
            return Err(err);
        }
        Ok(destroyed?)
    }
}
// update
impl WinitApp {
    fn fail(&mut self, event_loop: &ActiveEventLoop, err: anyhow::Error) {
        log::error!("{:#}", err);
        self.fatal = Some(err);
        event_loop.exit();
    }

    fn redraw(&mut self) -> anyhow::Result<()> {
        if let Some(renderer) = self.renderer.as_mut() {
            renderer.render_frame(|_| {})?;
        }
        Ok(())
    }
}
// 各种 winit 的事件处理
impl ApplicationHandler for WinitApp {
    // 建议在这里创建 window 和 Renderer
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        log::info!("winit event: resumed");
        if self.window.is_some() {
            return;
        }

        if let Err(err) = self.init_after_window(event_loop) {
            self.fail(event_loop, err.context("initializing renderer"));
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _window_id: WindowId, event: WindowEvent) {
        match event {
            WindowEvent::CloseRequested => {
                event_loop.exit();
            }
            WindowEvent::Resized(physical_size) => {
                if let Some(renderer) = self.renderer.as_mut() {
                    renderer.on_resize(physical_size.width, physical_size.height);
                }
            }
            WindowEvent::RedrawRequested => {
                if let Err(err) = self.redraw() {
                    self.fail(event_loop, err);
                }
            }
            _ => {}
        }
    }

    fn about_to_wait(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(window) = self.window.as_ref() {
            window.request_redraw();
        }
    }

    fn suspended(&mut self, _event_loop: &ActiveEventLoop) {
        log::warn!("winit event: suspended");
    }

    fn exiting(&mut self, _event_loop: &ActiveEventLoop) {
        log::info!("loop exiting");
    }
}
