//! Named shader sources.
//!
//! Stages look their kernels up by name every frame until resolution succeeds,
//! so a host can register or replace a module at runtime.

use std::borrow::Cow;
use std::collections::HashMap;

use limssr_gpu_shared::shaders;

use crate::error::{Result, SsrError};

pub const FULLSCREEN_QUAD_SHADER: &str = "limssr/fullscreen_quad";
pub const SSR_SHADER: &str = "limssr/ssr";
pub const DEPTH_PYRAMID_SHADER: &str = "limssr/depth_pyramid";
pub const BLIT_SHADER: &str = "limssr/blit";

#[derive(Clone, Debug, Default)]
pub struct ShaderLibrary {
    sources: HashMap<String, Cow<'static, str>>,
}

impl ShaderLibrary {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Library holding every built-in LimSSR kernel.
    pub fn builtin() -> Self {
        let mut library = Self::empty();
        library.register(FULLSCREEN_QUAD_SHADER, shaders::FULLSCREEN_QUAD_VERT);
        library.register(SSR_SHADER, shaders::SSR_SHADER);
        library.register(DEPTH_PYRAMID_SHADER, shaders::DEPTH_PYRAMID_SHADER);
        library.register(BLIT_SHADER, shaders::BLIT_FRAG);
        library
    }

    pub fn register(&mut self, name: &str, source: impl Into<Cow<'static, str>>) {
        self.sources.insert(name.to_owned(), source.into());
    }

    pub fn remove(&mut self, name: &str) -> Option<Cow<'static, str>> {
        self.sources.remove(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.sources.contains_key(name)
    }

    pub fn source(&self, name: &str) -> Result<&str> {
        self.sources
            .get(name)
            .map(|s| s.as_ref())
            .ok_or_else(|| SsrError::ShaderNotFound(name.to_owned()))
    }
}
