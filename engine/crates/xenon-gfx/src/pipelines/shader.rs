use std::collections::HashMap;
use std::path::{Path, PathBuf};

use anyhow::Context;
use ash::vk;

use crate::{foundation::debug_messenger::DebugType, gfx::Gfx};

/// 从 `.spv` 文件加载的 shader module
///
/// # Destroy
/// 需要手动 `destroy`
pub struct GfxShaderModule {
    handle: vk::ShaderModule,

    #[cfg(debug_assertions)]
    destroyed: bool,
}

// new & init
impl GfxShaderModule {
    pub fn from_spv_file(path: &Path) -> anyhow::Result<Self> {
        let mut file = std::fs::File::open(path).with_context(|| format!("failed to open shader {:?}", path))?;
        let code = ash::util::read_spv(&mut file).with_context(|| format!("invalid spir-v {:?}", path))?;

        let gfx_device = Gfx::get().gfx_device();
        let handle = unsafe { gfx_device.create_shader_module(&vk::ShaderModuleCreateInfo::default().code(&code), None) }
            .with_context(|| format!("failed to create shader module {:?}", path))?;

        let module = Self {
            handle,
            #[cfg(debug_assertions)]
            destroyed: false,
        };
        let file_name = path.file_name().map_or_else(|| path.to_string_lossy(), |name| name.to_string_lossy());
        gfx_device.set_debug_name(&module, file_name);
        Ok(module)
    }
}

// getters
impl GfxShaderModule {
    #[inline]
    pub fn handle(&self) -> vk::ShaderModule {
        self.handle
    }
}

// destroy
impl GfxShaderModule {
    pub fn destroy(mut self) {
        unsafe { Gfx::get().gfx_device().destroy_shader_module(self.handle, None) };
        #[cfg(debug_assertions)]
        {
            self.destroyed = true;
        }
    }
}

impl Drop for GfxShaderModule {
    fn drop(&mut self) {
        #[cfg(debug_assertions)]
        debug_assert!(self.destroyed, "GfxShaderModule must be destroyed manually before drop.");
    }
}
impl DebugType for GfxShaderModule {
    fn debug_type_name() -> &'static str {
        "GfxShaderModule"
    }

    fn vk_handle(&self) -> impl vk::Handle {
        self.handle
    }
}

/// 同一批 pipeline 创建过程中共享 shader module，例如所有 effect 共用的 vertex shader
///
/// pipeline 创建完成之后就可以 `destroy`
#[derive(Default)]
pub struct GfxShaderModuleCache {
    modules: HashMap<PathBuf, GfxShaderModule>,
}

impl GfxShaderModuleCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_or_load(&mut self, path: &Path) -> anyhow::Result<vk::ShaderModule> {
        if let Some(module) = self.modules.get(path) {
            return Ok(module.handle());
        }
        let module = GfxShaderModule::from_spv_file(path)?;
        let handle = module.handle();
        self.modules.insert(path.to_path_buf(), module);
        Ok(handle)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.modules.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }

    pub fn destroy(mut self) {
        self.modules.drain().for_each(|(_, module)| module.destroy());
    }
}

impl Drop for GfxShaderModuleCache {
    fn drop(&mut self) {
        debug_assert!(self.modules.is_empty(), "GfxShaderModuleCache must be destroyed manually before drop.");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_cache_destroy() {
        let cache = GfxShaderModuleCache::new();
        assert!(cache.is_empty());
        cache.destroy();
    }
}
