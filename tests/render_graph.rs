//! Render graph scheduling and barrier placement, observed through the
//! recording null backend.

use std::rc::Rc;

use vermeil::graph::{
    ExecResources, GraphicsPassColorTargetBuilder,
};
use vermeil::rhi::null::{Event, NullDevice};
use vermeil::rhi::{self, ResourceAccess};
use vermeil::{
    CommandHelpers, FrameDescriptors, GpuScene, GraphicsContext, MemoryVfs, PipelineCache,
    RenderGraph, ShaderCompiler, ShaderSourceCompiler, Vfs,
};

struct NoopCompiler;

impl ShaderSourceCompiler for NoopCompiler {
    fn compile(
        &self,
        source: &str,
        _entry: &str,
        _stage: rhi::ShaderStage,
    ) -> Result<Vec<u8>, String> {
        Ok(source.as_bytes().to_vec())
    }
}

struct Harness {
    log: vermeil::rhi::null::EventLog,
    ctx: Rc<GraphicsContext>,
    graph: RenderGraph,
    scene: GpuScene,
    pipelines: PipelineCache,
    frame: FrameDescriptors,
    helpers: CommandHelpers,
}

impl Harness {
    fn new() -> Harness {
        let device = NullDevice::new();
        let log = device.event_log();
        let device: Rc<dyn rhi::Device> = Rc::new(device);
        let ctx = GraphicsContext::new(device, 2);

        let vfs: Rc<dyn Vfs> = Rc::new(
            MemoryVfs::new()
                .with_file("/vermeil/shaders/core/blit.hlsl", b"// blit\n")
                .with_file("/vermeil/shaders/core/mipmap.hlsl", b"// mipmap\n"),
        );
        let mut compiler = ShaderCompiler::new(&ctx, vfs, Box::new(NoopCompiler));
        let mut helpers = CommandHelpers::new(&ctx);
        helpers.initialize(&mut compiler);

        Harness {
            log,
            graph: RenderGraph::new(&ctx),
            scene: GpuScene::new(),
            pipelines: PipelineCache::new(compiler),
            frame: FrameDescriptors::new(&ctx),
            helpers,
            ctx,
        }
    }

    fn execute(&mut self) -> bool {
        let pool = self.ctx.device().create_command_pool();
        self.graph.set_command_encoder(pool.get_command_encoder());
        let mut res = ExecResources {
            ctx: &self.ctx,
            scene: &self.scene,
            pipelines: &mut self.pipelines,
            frame: &mut self.frame,
            helpers: &mut self.helpers,
        };
        let executed = self.graph.execute(&mut res);
        self.graph.take_command_encoder();
        executed
    }

    fn texture_barriers(&self) -> Vec<(u64, ResourceAccess, ResourceAccess)> {
        self.log
            .borrow()
            .iter()
            .filter_map(|event| match event {
                Event::TextureBarrier {
                    texture, src, dst, ..
                } => Some((*texture, *src, *dst)),
                _ => None,
            })
            .collect()
    }

    fn buffer_barriers(&self) -> Vec<(u64, ResourceAccess, ResourceAccess)> {
        self.log
            .borrow()
            .iter()
            .filter_map(|event| match event {
                Event::BufferBarrier { buffer, src, dst } => Some((*buffer, *src, *dst)),
                _ => None,
            })
            .collect()
    }

    fn clear_log(&self) {
        self.log.borrow_mut().clear();
    }
}

fn color_texture(graph: &mut RenderGraph) -> vermeil::TextureHandle {
    graph.add_texture(|builder| {
        builder
            .extent_2d(64, 64)
            .format(rhi::ResourceFormat::Rgba8Unorm)
            .usage(rhi::TextureUsage::COLOR_ATTACHMENT | rhi::TextureUsage::SAMPLED);
    })
}

#[test]
fn alias_chain_orders_passes_and_barriers() {
    let mut harness = Harness::new();

    let texture = color_texture(&mut harness.graph);
    harness.graph.add_graphics_pass(
        "gbuffer",
        (),
        |builder, _| {
            builder.use_color(
                0,
                GraphicsPassColorTargetBuilder::new(texture).clear_color([0.0; 4]),
            );
        },
        |_, _| {},
    );
    harness.graph.add_compute_pass(
        "analyze",
        (),
        |builder, _| {
            builder.read_texture(texture);
        },
        |_, _| {},
    );
    // writing after the read splits the node into an aliasing chain; the
    // setup closure hands the downstream alias back out
    let mut chained = None;
    harness.graph.add_graphics_pass(
        "overlay",
        (),
        |builder, _| {
            chained = Some(builder.use_color(0, GraphicsPassColorTargetBuilder::new(texture)));
        },
        |_, _| {},
    );
    let chained = chained.expect("overlay setup did not run");
    assert_ne!(chained, texture);
    harness.graph.add_present_pass(chained);

    assert!(harness.execute());

    // pass order: gbuffer, analyze, alias, overlay, present
    let pass_labels: Vec<String> = harness
        .log
        .borrow()
        .iter()
        .filter_map(|event| match event {
            Event::BeginRenderPass { label } | Event::BeginComputePass { label } => {
                Some(label.clone())
            }
            _ => None,
        })
        .collect();
    assert_eq!(pass_labels, ["gbuffer", "analyze", "overlay"]);

    let barriers = harness.texture_barriers();
    assert_eq!(
        barriers
            .iter()
            .map(|&(_, src, dst)| (src, dst))
            .collect::<Vec<_>>(),
        [
            (ResourceAccess::NONE, ResourceAccess::COLOR_ATTACHMENT_WRITE),
            (
                ResourceAccess::COLOR_ATTACHMENT_WRITE,
                ResourceAccess::SAMPLED_TEXTURE_READ
            ),
            // write-after-read on the same underlying allocation
            (
                ResourceAccess::SAMPLED_TEXTURE_READ,
                ResourceAccess::COLOR_ATTACHMENT_WRITE
            ),
            (
                ResourceAccess::COLOR_ATTACHMENT_WRITE,
                ResourceAccess::SAMPLED_TEXTURE_READ
            ),
        ]
    );
    // every member of the chain resolves to the same pooled texture
    assert!(barriers.windows(2).all(|pair| pair[0].0 == pair[1].0));
}

#[test]
fn storage_write_after_write_emits_a_barrier() {
    let mut harness = Harness::new();

    let buffer = harness.graph.add_buffer(|builder| {
        builder.size(1024).usage(
            rhi::BufferUsage::STORAGE_READ | rhi::BufferUsage::STORAGE_READ_WRITE,
        );
    });
    harness.graph.add_compute_pass(
        "scatter",
        (),
        |builder, _| {
            builder.write_buffer(buffer);
        },
        |_, _| {},
    );
    let mut chained = None;
    harness.graph.add_compute_pass(
        "scatter again",
        (),
        |builder, _| {
            chained = Some(builder.write_buffer(buffer));
        },
        |_, _| {},
    );
    let chained = chained.expect("setup did not run");
    assert_ne!(chained, buffer);

    let target = color_texture(&mut harness.graph);
    harness.graph.add_graphics_pass(
        "consume",
        (),
        |builder, _| {
            builder.read_buffer(chained);
            builder.use_color(0, GraphicsPassColorTargetBuilder::new(target));
        },
        |_, _| {},
    );
    harness.graph.add_present_pass(target);

    assert!(harness.execute());

    let barriers = harness.buffer_barriers();
    assert_eq!(
        barriers
            .iter()
            .map(|&(_, src, dst)| (src, dst))
            .collect::<Vec<_>>(),
        [
            (ResourceAccess::NONE, ResourceAccess::STORAGE_WRITE),
            // write-after-write must serialise even though the state is equal
            (ResourceAccess::STORAGE_WRITE, ResourceAccess::STORAGE_WRITE),
            (ResourceAccess::STORAGE_WRITE, ResourceAccess::STORAGE_READ),
        ]
    );
    // the whole chain shares one underlying pool buffer
    assert!(barriers.windows(2).all(|pair| pair[0].0 == pair[1].0));
}

#[test]
fn missing_present_pass_invalidates_the_graph() {
    let mut harness = Harness::new();

    let texture = color_texture(&mut harness.graph);
    harness.graph.add_graphics_pass(
        "a",
        (),
        |builder, _| {
            builder.use_color(0, GraphicsPassColorTargetBuilder::new(texture));
        },
        |_, _| {},
    );
    harness.graph.add_compute_pass(
        "b",
        (),
        |builder, _| {
            builder.read_texture(texture);
        },
        |_, _| {},
    );

    assert!(!harness.execute());
    // no barriers, no passes, no transient allocations were recorded
    assert!(harness.log.borrow().is_empty());

    // builder state was cleared; the graph is usable again
    let texture = color_texture(&mut harness.graph);
    harness.graph.add_graphics_pass(
        "a",
        (),
        |builder, _| {
            builder.use_color(0, GraphicsPassColorTargetBuilder::new(texture));
        },
        |_, _| {},
    );
    harness.graph.add_present_pass(texture);
    assert!(harness.execute());
}

#[test]
fn pooled_textures_are_reused_across_frames() {
    let mut harness = Harness::new();

    for frame in 0..2 {
        let texture = color_texture(&mut harness.graph);
        harness.graph.add_graphics_pass(
            "draw",
            (),
            |builder, _| {
                builder.use_color(0, GraphicsPassColorTargetBuilder::new(texture));
            },
            |_, _| {},
        );
        harness.graph.add_present_pass(texture);
        assert!(harness.execute());

        let barriers = harness.texture_barriers();
        if frame == 0 {
            assert_eq!(
                barriers
                    .iter()
                    .map(|&(_, src, dst)| (src, dst))
                    .collect::<Vec<_>>(),
                [
                    (ResourceAccess::NONE, ResourceAccess::COLOR_ATTACHMENT_WRITE),
                    (
                        ResourceAccess::COLOR_ATTACHMENT_WRITE,
                        ResourceAccess::SAMPLED_TEXTURE_READ
                    ),
                ]
            );
        } else {
            // the recycled entry carried its released access state forward
            assert_eq!(
                barriers
                    .iter()
                    .map(|&(_, src, dst)| (src, dst))
                    .collect::<Vec<_>>(),
                [
                    (
                        ResourceAccess::SAMPLED_TEXTURE_READ,
                        ResourceAccess::COLOR_ATTACHMENT_WRITE
                    ),
                    (
                        ResourceAccess::COLOR_ATTACHMENT_WRITE,
                        ResourceAccess::SAMPLED_TEXTURE_READ
                    ),
                ]
            );
        }
        harness.clear_log();
        harness.ctx.advance_frame();
    }
}

#[test]
fn blit_pass_runs_the_fullscreen_pipeline() {
    let mut harness = Harness::new();

    let src = color_texture(&mut harness.graph);
    harness.graph.add_graphics_pass(
        "fill",
        (),
        |builder, _| {
            builder.use_color(0, GraphicsPassColorTargetBuilder::new(src));
        },
        |_, _| {},
    );
    let dst = color_texture(&mut harness.graph);
    harness.graph.add_blit_pass(
        "copy",
        src,
        0,
        0,
        dst,
        0,
        0,
        vermeil::graph::BlitPassMode::Normal,
    );
    harness.graph.add_present_pass(dst);

    assert!(harness.execute());

    let events = harness.log.borrow();
    assert!(events.iter().any(|event| match event {
        Event::BeginRenderPass { label } => label.as_str() == "blit (color)",
        _ => false,
    }));
    // the fullscreen triangle
    assert!(events
        .iter()
        .any(|event| *event == Event::Draw { num_vertices: 3 }));

    // source transitions to sampled read, destination to color write
    let barriers: Vec<_> = harness.texture_barriers();
    assert!(barriers.iter().any(|&(_, src, dst)| src
        == ResourceAccess::COLOR_ATTACHMENT_WRITE
        && dst == ResourceAccess::SAMPLED_TEXTURE_READ));
    assert!(barriers
        .iter()
        .any(|&(_, src, dst)| src == ResourceAccess::NONE
            && dst == ResourceAccess::COLOR_ATTACHMENT_WRITE));
}
