//! Shader compilation pipeline and on-disk binary cache.
//!
//! Compilation itself is delegated to a [`ShaderSourceCompiler`]; this module
//! owns preprocessing, the in-memory module cache keyed by
//! `(source path, entry, environment)` and the persistent binary cache with
//! its index file and age-based eviction.

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use fxhash::FxHashMap;
use std::io::Read;
use std::rc::Rc;

use super::environment::CompilerEnvironment;
use super::preprocessor::preprocess;
use crate::context::GraphicsContext;
use crate::rhi;
use crate::utils::stable_hash;
use crate::vfs::Vfs;

/// Compiles preprocessed shader source into backend bytecode.
pub trait ShaderSourceCompiler {
    fn compile(
        &self,
        source: &str,
        entry: &str,
        stage: rhi::ShaderStage,
    ) -> Result<Vec<u8>, String>;
}

const SHADER_BINARIES_DIR: &str = "/project/binaries/shaders";
const SHADER_BINARY_INFO_PATH: &str = "/project/binaries/shaders/binary_info.db";
const SHADER_BINARY_INFO_MAGIC: u32 = 0x5373_d269;
const EVICTION_AGE_SECONDS: u64 = 30 * 24 * 3600;

struct ShaderBinaryInfo {
    shader_key: String,
    source_path: String,
    entry: String,
    shader_hash: u64,
    last_used_timestamp: u64,
}

pub struct ShaderCompiler {
    ctx: Rc<GraphicsContext>,
    vfs: Rc<dyn Vfs>,
    source_compiler: Box<dyn ShaderSourceCompiler>,
    binary_suffix: &'static str,
    infos: Vec<ShaderBinaryInfo>,
    info_map: FxHashMap<String, usize>,
    cached_modules: FxHashMap<String, Rc<dyn rhi::ShaderModule>>,
}

fn now_timestamp() -> u64 {
    time::get_time().sec.max(0) as u64
}

impl ShaderCompiler {
    pub fn new(
        ctx: &Rc<GraphicsContext>,
        vfs: Rc<dyn Vfs>,
        source_compiler: Box<dyn ShaderSourceCompiler>,
    ) -> ShaderCompiler {
        let mut compiler = ShaderCompiler {
            ctx: ctx.clone(),
            vfs,
            source_compiler,
            binary_suffix: ctx.properties().shader_binary_suffix,
            infos: Vec::new(),
            info_map: FxHashMap::default(),
            cached_modules: FxHashMap::default(),
        };
        compiler.read_binary_info_file();
        compiler
    }

    pub fn vfs(&self) -> &Rc<dyn Vfs> {
        &self.vfs
    }

    /// Compiles (or fetches from cache) the shader at `source_path`.
    pub fn compile_shader(
        &mut self,
        source_path: &str,
        entry: &str,
        stage: rhi::ShaderStage,
        environment: &CompilerEnvironment,
    ) -> Result<Rc<dyn rhi::ShaderModule>, String> {
        let source =
            preprocess(&*self.vfs, source_path, environment).map_err(|e| e.to_string())?;
        let shader_key = format!(
            "{} {} {}",
            source_path,
            entry,
            environment.config_identifier()
        );
        let shader_hash = stable_hash(&source);
        let binary_path = self.compiled_shader_path(source_path);

        let index = self.get_or_insert_info(&shader_key, source_path, entry);
        let up_to_date =
            self.infos[index].shader_hash == shader_hash && self.vfs.exists(&binary_path);

        let bytecode = if up_to_date {
            if let Some(module) = self.cached_modules.get(&shader_key) {
                return Ok(module.clone());
            }
            match self.vfs.read(&binary_path) {
                Some(bytecode) => bytecode,
                // cache corruption: recompile transparently
                None => self.recompile(&source, entry, stage, &binary_path, index, shader_hash)?,
            }
        } else {
            self.recompile(&source, entry, stage, &binary_path, index, shader_hash)?
        };

        let module: Rc<dyn rhi::ShaderModule> =
            Rc::from(self.ctx.device().create_shader_module(&bytecode));
        self.cached_modules.insert(shader_key, module.clone());
        Ok(module)
    }

    fn recompile(
        &mut self,
        source: &str,
        entry: &str,
        stage: rhi::ShaderStage,
        binary_path: &str,
        index: usize,
        shader_hash: u64,
    ) -> Result<Vec<u8>, String> {
        log::debug!(
            target: "shader",
            "compiling `{}` ({})",
            self.infos[index].source_path,
            entry
        );
        let bytecode = self.source_compiler.compile(source, entry, stage)?;
        self.vfs.write(binary_path, &bytecode);
        self.infos[index].shader_hash = shader_hash;
        Ok(bytecode)
    }

    pub fn compiled_shader_path(&self, source_path: &str) -> String {
        format!("{}{}{}", SHADER_BINARIES_DIR, source_path, self.binary_suffix)
    }

    fn get_or_insert_info(&mut self, shader_key: &str, source_path: &str, entry: &str) -> usize {
        let timestamp = now_timestamp();
        if let Some(&index) = self.info_map.get(shader_key) {
            self.infos[index].last_used_timestamp = timestamp;
            return index;
        }
        let index = self.infos.len();
        self.infos.push(ShaderBinaryInfo {
            shader_key: shader_key.to_string(),
            source_path: source_path.to_string(),
            entry: entry.to_string(),
            shader_hash: 0,
            last_used_timestamp: timestamp,
        });
        self.info_map.insert(shader_key.to_string(), index);
        index
    }

    /// Persists the binary cache index, evicting entries unused for more
    /// than 30 days and deleting their files.
    pub fn save(&mut self) {
        self.save_at(now_timestamp());
    }

    pub fn save_at(&mut self, now: u64) {
        self.infos
            .sort_by(|a, b| b.last_used_timestamp.cmp(&a.last_used_timestamp));
        let threshold = now.saturating_sub(EVICTION_AGE_SECONDS);
        while let Some(info) = self.infos.last() {
            if info.last_used_timestamp < threshold {
                let path = self.compiled_shader_path(&info.source_path);
                self.vfs.remove(&path);
                log::debug!(target: "shader", "evicted stale shader binary `{}`", path);
                self.infos.pop();
            } else {
                break;
            }
        }
        self.info_map = self
            .infos
            .iter()
            .enumerate()
            .map(|(i, info)| (info.shader_key.clone(), i))
            .collect();

        self.write_binary_info_file();
    }

    pub fn binary_info_count(&self) -> usize {
        self.infos.len()
    }

    fn read_binary_info_file(&mut self) {
        let data = match self.vfs.read(SHADER_BINARY_INFO_PATH) {
            Some(data) => data,
            None => return,
        };
        let mut reader = std::io::Cursor::new(data);

        let read = |reader: &mut std::io::Cursor<Vec<u8>>| -> Option<Vec<ShaderBinaryInfo>> {
            let magic = reader.read_u32::<LittleEndian>().ok()?;
            if magic != SHADER_BINARY_INFO_MAGIC {
                return None;
            }
            let count = reader.read_u32::<LittleEndian>().ok()?;
            let mut infos = Vec::with_capacity(count as usize);
            for _ in 0..count {
                let shader_key = read_string(reader)?;
                let source_path = read_string(reader)?;
                let entry = read_string(reader)?;
                let shader_hash = reader.read_u64::<LittleEndian>().ok()?;
                let last_used_timestamp = reader.read_u64::<LittleEndian>().ok()?;
                infos.push(ShaderBinaryInfo {
                    shader_key,
                    source_path,
                    entry,
                    shader_hash,
                    last_used_timestamp,
                });
            }
            Some(infos)
        };

        match read(&mut reader) {
            Some(infos) => {
                self.info_map = infos
                    .iter()
                    .enumerate()
                    .map(|(i, info)| (info.shader_key.clone(), i))
                    .collect();
                self.infos = infos;
            }
            None => {
                log::warn!(target: "shader", "discarding corrupt shader binary index");
            }
        }
    }

    fn write_binary_info_file(&self) {
        let mut data = Vec::new();
        data.write_u32::<LittleEndian>(SHADER_BINARY_INFO_MAGIC)
            .unwrap();
        data.write_u32::<LittleEndian>(self.infos.len() as u32)
            .unwrap();
        for info in &self.infos {
            write_string(&mut data, &info.shader_key);
            write_string(&mut data, &info.source_path);
            write_string(&mut data, &info.entry);
            data.write_u64::<LittleEndian>(info.shader_hash).unwrap();
            data.write_u64::<LittleEndian>(info.last_used_timestamp)
                .unwrap();
        }
        self.vfs.write(SHADER_BINARY_INFO_PATH, &data);
    }
}

fn read_string(reader: &mut std::io::Cursor<Vec<u8>>) -> Option<String> {
    let length = reader.read_u32::<LittleEndian>().ok()? as usize;
    let mut bytes = vec![0u8; length];
    reader.read_exact(&mut bytes).ok()?;
    String::from_utf8(bytes).ok()
}

fn write_string(data: &mut Vec<u8>, value: &str) {
    data.write_u32::<LittleEndian>(value.len() as u32).unwrap();
    data.extend_from_slice(value.as_bytes());
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rhi::null::NullDevice;
    use crate::vfs::MemoryVfs;
    use std::cell::Cell;

    struct CountingCompiler {
        count: Rc<Cell<u32>>,
    }

    impl ShaderSourceCompiler for CountingCompiler {
        fn compile(
            &self,
            source: &str,
            _entry: &str,
            _stage: rhi::ShaderStage,
        ) -> Result<Vec<u8>, String> {
            self.count.set(self.count.get() + 1);
            Ok(source.as_bytes().to_vec())
        }
    }

    struct FailingCompiler;

    impl ShaderSourceCompiler for FailingCompiler {
        fn compile(
            &self,
            _source: &str,
            _entry: &str,
            _stage: rhi::ShaderStage,
        ) -> Result<Vec<u8>, String> {
            Err("syntax error at line 3".to_string())
        }
    }

    fn test_setup() -> (Rc<GraphicsContext>, Rc<dyn Vfs>, Rc<Cell<u32>>) {
        let ctx = GraphicsContext::new(Rc::new(NullDevice::new()), 2);
        let vfs: Rc<dyn Vfs> = Rc::new(
            MemoryVfs::new().with_file("/shaders/a.hlsl", b"float4 vs_main() { return 0; }\n"),
        );
        (ctx, vfs, Rc::new(Cell::new(0)))
    }

    fn make_compiler(
        ctx: &Rc<GraphicsContext>,
        vfs: &Rc<dyn Vfs>,
        count: &Rc<Cell<u32>>,
    ) -> ShaderCompiler {
        ShaderCompiler::new(
            ctx,
            vfs.clone(),
            Box::new(CountingCompiler {
                count: count.clone(),
            }),
        )
    }

    #[test]
    fn modules_are_cached_per_key() {
        let (ctx, vfs, count) = test_setup();
        let mut compiler = make_compiler(&ctx, &vfs, &count);
        let env = CompilerEnvironment::new();

        let a = compiler
            .compile_shader("/shaders/a.hlsl", "vs_main", rhi::ShaderStage::VERTEX, &env)
            .unwrap();
        let b = compiler
            .compile_shader("/shaders/a.hlsl", "vs_main", rhi::ShaderStage::VERTEX, &env)
            .unwrap();
        assert!(Rc::ptr_eq(&a, &b));
        assert_eq!(count.get(), 1);

        // a different environment is a different shader
        let mut env2 = CompilerEnvironment::new();
        env2.set_define("VARIANT");
        compiler
            .compile_shader("/shaders/a.hlsl", "vs_main", rhi::ShaderStage::VERTEX, &env2)
            .unwrap();
        assert_eq!(count.get(), 2);
    }

    #[test]
    fn persisted_binary_survives_a_new_compiler() {
        let (ctx, vfs, count) = test_setup();
        let env = CompilerEnvironment::new();
        {
            let mut compiler = make_compiler(&ctx, &vfs, &count);
            compiler
                .compile_shader("/shaders/a.hlsl", "vs_main", rhi::ShaderStage::VERTEX, &env)
                .unwrap();
            compiler.save();
        }
        assert_eq!(count.get(), 1);

        let mut compiler = make_compiler(&ctx, &vfs, &count);
        compiler
            .compile_shader("/shaders/a.hlsl", "vs_main", rhi::ShaderStage::VERTEX, &env)
            .unwrap();
        // loaded from the binary cache, not recompiled
        assert_eq!(count.get(), 1);
    }

    #[test]
    fn source_change_triggers_recompilation() {
        let (ctx, vfs, count) = test_setup();
        let env = CompilerEnvironment::new();
        let mut compiler = make_compiler(&ctx, &vfs, &count);
        compiler
            .compile_shader("/shaders/a.hlsl", "vs_main", rhi::ShaderStage::VERTEX, &env)
            .unwrap();
        compiler.save();

        vfs.write("/shaders/a.hlsl", b"float4 vs_main() { return 1; }\n");
        let mut compiler = make_compiler(&ctx, &vfs, &count);
        compiler
            .compile_shader("/shaders/a.hlsl", "vs_main", rhi::ShaderStage::VERTEX, &env)
            .unwrap();
        assert_eq!(count.get(), 2);
    }

    #[test]
    fn stale_entries_are_evicted_on_save() {
        let (ctx, vfs, count) = test_setup();
        let env = CompilerEnvironment::new();
        let mut compiler = make_compiler(&ctx, &vfs, &count);
        compiler
            .compile_shader("/shaders/a.hlsl", "vs_main", rhi::ShaderStage::VERTEX, &env)
            .unwrap();
        let binary_path = compiler.compiled_shader_path("/shaders/a.hlsl");
        assert!(vfs.exists(&binary_path));
        assert_eq!(compiler.binary_info_count(), 1);

        let now = now_timestamp();
        // not yet stale
        compiler.save_at(now + EVICTION_AGE_SECONDS - 10);
        assert_eq!(compiler.binary_info_count(), 1);
        // 31 days later the entry and its file are gone
        compiler.save_at(now + EVICTION_AGE_SECONDS + 10);
        assert_eq!(compiler.binary_info_count(), 0);
        assert!(!vfs.exists(&binary_path));
    }

    #[test]
    fn compile_failure_surfaces_the_message() {
        let (ctx, vfs, _count) = test_setup();
        let mut compiler = ShaderCompiler::new(&ctx, vfs, Box::new(FailingCompiler));
        let err = compiler
            .compile_shader(
                "/shaders/a.hlsl",
                "vs_main",
                rhi::ShaderStage::VERTEX,
                &CompilerEnvironment::new(),
            )
            .unwrap_err();
        assert!(err.contains("syntax error"));
    }
}
