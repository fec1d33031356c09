//! Frame render graph.
//!
//! A DAG of resource nodes and pass nodes built afresh every frame. Passes
//! declare reads and writes; writes after prior use split the resource into
//! an aliasing chain sharing one pooled allocation. Compilation culls
//! unreachable nodes, topologically sorts the rest, and plans resource
//! lifetimes; execution materialises transients from the pool, plans the
//! minimum set of state-transition barriers and runs the pass callbacks
//! against one command encoder.

mod context;
mod pass;
mod pool;

pub use self::context::{
    ComputePassContext, ExecResources, GraphicsPassContext, RenderedObjectList,
    RenderedObjectListDesc, RenderedObjectListHandle, RenderedObjectListItem, RenderedObjectType,
    GRAPHICS_SET_CAMERA, GRAPHICS_SET_FRAGMENT, GRAPHICS_SET_MATERIAL, GRAPHICS_SET_MESH,
    GRAPHICS_SET_SAMPLERS,
};
pub use self::pass::{
    BlitPassMode, BufferBuilder, ComputePassBuilder, GraphicsPassBuilder,
    GraphicsPassColorTargetBuilder, GraphicsPassDepthStencilTargetBuilder, TextureBuilder,
};

use fxhash::FxHashMap;
use petgraph::graph::NodeIndex;
use petgraph::{Directed, Direction, Graph};
use smallvec::SmallVec;
use std::any::Any;
use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::rc::Rc;

use self::context::ResourceBindingContext;
use self::pass::{ColorTarget, DepthStencilTarget};
use self::pool::TransientPools;
use crate::accel::{AccelerationStructure, AccelerationStructureDesc};
use crate::buffer::Buffer;
use crate::context::GraphicsContext;
use crate::rhi;
use crate::scene::GpuScene;
use crate::texture::Texture;

type GraphIndex = NodeIndex<u32>;

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub struct BufferHandle(pub(crate) GraphIndex);

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub struct TextureHandle(pub(crate) GraphIndex);

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub struct AccelerationStructureHandle(pub(crate) GraphIndex);

/// Shared access state of one pooled resource. All members of an aliasing
/// chain point at the same cell.
type AccessCell = Rc<Cell<rhi::ResourceAccess>>;

#[derive(Clone)]
pub(crate) struct PoolBuffer {
    pub buffer: Rc<Buffer>,
    pub index: usize,
    pub access: AccessCell,
}

#[derive(Clone)]
pub(crate) struct PoolTexture {
    pub texture: Rc<Texture>,
    pub index: usize,
    pub access: AccessCell,
}

pub(crate) struct BufferNode {
    desc: rhi::BufferDesc,
    buffer: Option<PoolBuffer>,
    imported: bool,
    prev_alias: Option<GraphIndex>,
    next_alias: Option<GraphIndex>,
}

pub(crate) struct TextureNode {
    desc: rhi::TextureDesc,
    texture: Option<PoolTexture>,
    imported: bool,
    prev_alias: Option<GraphIndex>,
    next_alias: Option<GraphIndex>,
}

pub(crate) struct AccelNode {
    desc: AccelerationStructureDesc,
    accel: Option<Rc<AccelerationStructure>>,
}

type GraphicsExecuteFn =
    Box<dyn for<'a, 'r> FnOnce(&dyn Any, &mut GraphicsPassContext<'a, 'r>)>;
type ComputeExecuteFn = Box<dyn for<'a, 'r> FnOnce(&dyn Any, &mut ComputePassContext<'a, 'r>)>;

pub(crate) struct GraphicsPassNode {
    name: String,
    read_buffers: Vec<BufferHandle>,
    write_buffers: Vec<BufferHandle>,
    read_textures: Vec<TextureHandle>,
    write_textures: Vec<TextureHandle>,
    color_targets: Vec<Option<ColorTarget>>,
    depth_stencil_target: Option<DepthStencilTarget>,
    pass_data: Option<Box<dyn Any>>,
    execute_fn: Option<GraphicsExecuteFn>,
}

pub(crate) struct ComputePassNode {
    name: String,
    read_buffers: Vec<BufferHandle>,
    write_buffers: Vec<BufferHandle>,
    read_textures: Vec<TextureHandle>,
    write_textures: Vec<TextureHandle>,
    pass_data: Option<Box<dyn Any>>,
    execute_fn: Option<ComputeExecuteFn>,
}

pub(crate) struct BlitPassNode {
    name: String,
    src: TextureHandle,
    src_mip_level: u32,
    src_array_layer: u32,
    dst: TextureHandle,
    dst_mip_level: u32,
    dst_array_layer: u32,
    mode: BlitPassMode,
}

pub(crate) struct PresentPassNode {
    texture: TextureHandle,
}

pub(crate) enum Node {
    Buffer(BufferNode),
    Texture(TextureNode),
    AccelerationStructure(AccelNode),
    GraphicsPass(GraphicsPassNode),
    ComputePass(ComputePassNode),
    BlitPass(BlitPassNode),
    PresentPass(PresentPassNode),
    AliasPass,
}

impl Node {
    fn is_resource(&self) -> bool {
        match self {
            Node::Buffer(_) | Node::Texture(_) | Node::AccelerationStructure(_) => true,
            _ => false,
        }
    }

    fn is_pass(&self) -> bool {
        !self.is_resource()
    }
}

struct PendingBufferBarrier {
    buffer: Rc<Buffer>,
    src_access: rhi::ResourceAccess,
    dst_access: rhi::ResourceAccess,
}

struct PendingTextureBarrier {
    texture: Rc<Texture>,
    src_access: rhi::ResourceAccess,
    dst_access: rhi::ResourceAccess,
}

/// A barrier is needed when the access changes, or when both sides contain a
/// storage write (write-after-write hazards must serialise).
fn need_barrier(from: rhi::ResourceAccess, to: rhi::ResourceAccess) -> bool {
    from != to
        || (from.contains(rhi::ResourceAccess::STORAGE_WRITE)
            && to.contains(rhi::ResourceAccess::STORAGE_WRITE))
}

pub struct RenderGraph {
    ctx: Rc<GraphicsContext>,
    pub(crate) graph: Graph<Node, (), Directed, u32>,
    present_pass: Option<GraphIndex>,
    back_buffer: Option<TextureHandle>,
    imported_buffers: FxHashMap<usize, BufferHandle>,
    imported_textures: FxHashMap<usize, TextureHandle>,
    pools: TransientPools,
    graph_order: Vec<GraphIndex>,
    resources_to_create: Vec<Vec<GraphIndex>>,
    resources_to_destroy: Vec<Vec<GraphIndex>>,
    invalid: bool,
    cmd_encoder: RefCell<Option<Box<dyn rhi::CommandEncoder>>>,
    rendered_object_lists: Vec<RenderedObjectList>,
}

impl RenderGraph {
    pub fn new(ctx: &Rc<GraphicsContext>) -> RenderGraph {
        RenderGraph {
            ctx: ctx.clone(),
            graph: Graph::new(),
            present_pass: None,
            back_buffer: None,
            imported_buffers: FxHashMap::default(),
            imported_textures: FxHashMap::default(),
            pools: TransientPools::default(),
            graph_order: Vec::new(),
            resources_to_create: Vec::new(),
            resources_to_destroy: Vec::new(),
            invalid: false,
            cmd_encoder: RefCell::new(None),
            rendered_object_lists: Vec::new(),
        }
    }

    //----------------------------------------------------------------------------------------------
    // Construction

    pub fn add_buffer(&mut self, setup: impl FnOnce(&mut BufferBuilder)) -> BufferHandle {
        let mut builder = BufferBuilder::new();
        setup(&mut builder);
        let index = self.graph.add_node(Node::Buffer(BufferNode {
            desc: builder.desc,
            buffer: None,
            imported: false,
            prev_alias: None,
            next_alias: None,
        }));
        BufferHandle(index)
    }

    /// Imports a buffer owned outside the graph. Repeated imports of the same
    /// wrapper return the same handle.
    pub fn import_buffer(&mut self, buffer: &Rc<Buffer>) -> BufferHandle {
        let key = Rc::as_ptr(buffer) as usize;
        if let Some(&handle) = self.imported_buffers.get(&key) {
            return handle;
        }
        let index = self.graph.add_node(Node::Buffer(BufferNode {
            desc: buffer.desc().clone(),
            buffer: Some(PoolBuffer {
                buffer: buffer.clone(),
                index: usize::max_value(),
                access: Rc::new(Cell::new(rhi::ResourceAccess::NONE)),
            }),
            imported: true,
            prev_alias: None,
            next_alias: None,
        }));
        let handle = BufferHandle(index);
        self.imported_buffers.insert(key, handle);
        handle
    }

    pub fn add_texture(&mut self, setup: impl FnOnce(&mut TextureBuilder)) -> TextureHandle {
        let mut builder = TextureBuilder::new();
        setup(&mut builder);
        let index = self.graph.add_node(Node::Texture(TextureNode {
            desc: builder.desc,
            texture: None,
            imported: false,
            prev_alias: None,
            next_alias: None,
        }));
        TextureHandle(index)
    }

    pub fn import_texture(
        &mut self,
        texture: &Rc<Texture>,
        access: rhi::ResourceAccess,
    ) -> TextureHandle {
        let key = Rc::as_ptr(texture) as usize;
        if let Some(&handle) = self.imported_textures.get(&key) {
            return handle;
        }
        let index = self.graph.add_node(Node::Texture(TextureNode {
            desc: texture.desc().clone(),
            texture: Some(PoolTexture {
                texture: texture.clone(),
                index: usize::max_value(),
                access: Rc::new(Cell::new(access)),
            }),
            imported: true,
            prev_alias: None,
            next_alias: None,
        }));
        let handle = TextureHandle(index);
        self.imported_textures.insert(key, handle);
        handle
    }

    /// The camera target this graph renders into, imported by
    /// [`set_back_buffer`](Self::set_back_buffer).
    pub fn import_back_buffer(&self) -> Option<TextureHandle> {
        self.back_buffer
    }

    pub fn set_back_buffer(
        &mut self,
        texture: &Rc<Texture>,
        access: rhi::ResourceAccess,
    ) -> TextureHandle {
        let handle = self.import_texture(texture, access);
        self.back_buffer = Some(handle);
        self.add_present_pass(handle);
        handle
    }

    pub fn add_acceleration_structure(
        &mut self,
        desc: AccelerationStructureDesc,
    ) -> AccelerationStructureHandle {
        let index = self
            .graph
            .add_node(Node::AccelerationStructure(AccelNode { desc, accel: None }));
        AccelerationStructureHandle(index)
    }

    pub fn add_graphics_pass<T: Any>(
        &mut self,
        name: &str,
        data: T,
        setup: impl FnOnce(&mut GraphicsPassBuilder<'_>, &mut T),
        execute: impl for<'a, 'r> FnOnce(&T, &mut GraphicsPassContext<'a, 'r>) + 'static,
    ) {
        let pass_index = self.graph.add_node(Node::GraphicsPass(GraphicsPassNode {
            name: name.to_string(),
            read_buffers: Vec::new(),
            write_buffers: Vec::new(),
            read_textures: Vec::new(),
            write_textures: Vec::new(),
            color_targets: Vec::new(),
            depth_stencil_target: None,
            pass_data: None,
            execute_fn: None,
        }));
        let mut data = data;
        {
            let mut builder = GraphicsPassBuilder {
                graph: self,
                pass_index,
            };
            setup(&mut builder, &mut data);
        }
        if let Node::GraphicsPass(node) = &mut self.graph[pass_index] {
            node.pass_data = Some(Box::new(data));
            node.execute_fn = Some(Box::new(move |data, pass_ctx| {
                let data = data.downcast_ref::<T>().expect("pass data type mismatch");
                execute(data, pass_ctx);
            }));
        }
    }

    pub fn add_compute_pass<T: Any>(
        &mut self,
        name: &str,
        data: T,
        setup: impl FnOnce(&mut ComputePassBuilder<'_>, &mut T),
        execute: impl for<'a, 'r> FnOnce(&T, &mut ComputePassContext<'a, 'r>) + 'static,
    ) {
        let pass_index = self.graph.add_node(Node::ComputePass(ComputePassNode {
            name: name.to_string(),
            read_buffers: Vec::new(),
            write_buffers: Vec::new(),
            read_textures: Vec::new(),
            write_textures: Vec::new(),
            pass_data: None,
            execute_fn: None,
        }));
        let mut data = data;
        {
            let mut builder = ComputePassBuilder {
                graph: self,
                pass_index,
            };
            setup(&mut builder, &mut data);
        }
        if let Node::ComputePass(node) = &mut self.graph[pass_index] {
            node.pass_data = Some(Box::new(data));
            node.execute_fn = Some(Box::new(move |data, pass_ctx| {
                let data = data.downcast_ref::<T>().expect("pass data type mismatch");
                execute(data, pass_ctx);
            }));
        }
    }

    pub fn add_blit_pass(
        &mut self,
        name: &str,
        src: TextureHandle,
        src_mip_level: u32,
        src_array_layer: u32,
        dst: TextureHandle,
        dst_mip_level: u32,
        dst_array_layer: u32,
        mode: BlitPassMode,
    ) {
        let pass_index = self.graph.add_node(Node::BlitPass(BlitPassNode {
            name: name.to_string(),
            src,
            src_mip_level,
            src_array_layer,
            dst,
            dst_mip_level,
            dst_array_layer,
            mode,
        }));
        self.add_read_edge(pass_index, src.0);
        self.add_write_edge_texture(pass_index, dst);
    }

    pub fn add_present_pass(&mut self, texture: TextureHandle) {
        let pass_index = self
            .graph
            .add_node(Node::PresentPass(PresentPassNode { texture }));
        self.graph.add_edge(texture.0, pass_index, ());
        self.present_pass = Some(pass_index);
    }

    pub fn add_rendered_object_list(
        &mut self,
        scene: &GpuScene,
        desc: RenderedObjectListDesc,
    ) -> RenderedObjectListHandle {
        let mut drawables = Vec::new();
        scene.for_each_drawable(|drawable| {
            if drawable.mesh.num_indices() == 0 {
                return;
            }
            let material_is_opaque = drawable.material.blend_mode().is_opaque();
            let wanted = (desc
                .object_type
                .contains(RenderedObjectType::OPAQUE)
                && material_is_opaque)
                || (desc
                    .object_type
                    .contains(RenderedObjectType::TRANSPARENT)
                    && !material_is_opaque);
            if wanted {
                drawables.push(drawable.clone());
            }
        });

        fn sort_key(drawable: &crate::drawable::Drawable) -> (usize, usize, u32) {
            let mesh = Rc::as_ptr(&drawable.mesh) as *const () as usize;
            let base_material = drawable
                .material
                .base_material()
                .map(|material| Rc::as_ptr(&material) as *const () as usize)
                .unwrap_or(0);
            (mesh, base_material, drawable.mesh.primitive_topology() as u32)
        }
        drawables.sort_by_key(|drawable| sort_key(drawable));

        let mut items = Vec::new();
        let mut run_start = 0;
        for i in 0..drawables.len() {
            let end_of_run = i + 1 == drawables.len()
                || sort_key(&drawables[i]) != sort_key(&drawables[i + 1]);
            if end_of_run {
                items.push(RenderedObjectListItem {
                    drawables: drawables[run_start..=i].to_vec(),
                });
                run_start = i + 1;
            }
        }

        self.rendered_object_lists.push(RenderedObjectList {
            camera: desc.camera,
            fragment_shader: desc.fragment_shader,
            items,
        });
        RenderedObjectListHandle(self.rendered_object_lists.len() - 1)
    }

    pub fn rendered_object_list(&self, handle: RenderedObjectListHandle) -> &RenderedObjectList {
        &self.rendered_object_lists[handle.0]
    }

    //----------------------------------------------------------------------------------------------
    // Edges and aliasing

    pub(crate) fn add_read_edge(&mut self, pass_index: GraphIndex, resource: GraphIndex) {
        self.graph.add_edge(resource, pass_index, ());
    }

    pub(crate) fn add_write_edge_buffer(
        &mut self,
        pass_index: GraphIndex,
        handle: BufferHandle,
    ) -> BufferHandle {
        let has_consumers = self
            .graph
            .neighbors_directed(handle.0, Direction::Incoming)
            .next()
            .is_some();
        if !has_consumers {
            self.graph.add_edge(pass_index, handle.0, ());
            handle
        } else {
            BufferHandle(self.add_alias_node(pass_index, handle.0))
        }
    }

    pub(crate) fn add_write_edge_texture(
        &mut self,
        pass_index: GraphIndex,
        handle: TextureHandle,
    ) -> TextureHandle {
        let has_consumers = self
            .graph
            .neighbors_directed(handle.0, Direction::Incoming)
            .next()
            .is_some();
        if !has_consumers {
            self.graph.add_edge(pass_index, handle.0, ());
            handle
        } else {
            TextureHandle(self.add_alias_node(pass_index, handle.0))
        }
    }

    /// Splits a written-after-use resource: inserts an alias pass after the
    /// existing consumers and produces a fresh downstream resource node
    /// sharing the same pooled allocation.
    fn add_alias_node(&mut self, pass_index: GraphIndex, from: GraphIndex) -> GraphIndex {
        let alias_index = self.graph.add_node(Node::AliasPass);
        let consumers: SmallVec<[GraphIndex; 8]> = self
            .graph
            .neighbors_directed(from, Direction::Outgoing)
            .collect();
        for consumer in consumers {
            self.graph.add_edge(consumer, alias_index, ());
        }
        self.graph.add_edge(from, alias_index, ());
        self.graph.add_edge(alias_index, pass_index, ());

        let out_node = match &self.graph[from] {
            Node::Buffer(node) => Node::Buffer(BufferNode {
                desc: node.desc.clone(),
                buffer: None,
                imported: node.imported,
                prev_alias: Some(from),
                next_alias: None,
            }),
            Node::Texture(node) => Node::Texture(TextureNode {
                desc: node.desc.clone(),
                texture: None,
                imported: node.imported,
                prev_alias: Some(from),
                next_alias: None,
            }),
            _ => panic!("aliasing a pass node"),
        };
        let out_index = self.graph.add_node(out_node);
        self.graph.add_edge(alias_index, out_index, ());
        self.graph.add_edge(pass_index, out_index, ());

        match &mut self.graph[from] {
            Node::Buffer(node) => node.next_alias = Some(out_index),
            Node::Texture(node) => node.next_alias = Some(out_index),
            _ => unreachable!(),
        }
        out_index
    }

    //----------------------------------------------------------------------------------------------
    // Resource access

    pub fn buffer(&self, handle: BufferHandle) -> Rc<Buffer> {
        self.pool_buffer(handle).buffer.clone()
    }

    pub fn texture(&self, handle: TextureHandle) -> Rc<Texture> {
        self.pool_texture(handle).texture.clone()
    }

    pub fn acceleration_structure(
        &self,
        handle: AccelerationStructureHandle,
    ) -> Rc<AccelerationStructure> {
        match &self.graph[handle.0] {
            Node::AccelerationStructure(node) => node
                .accel
                .clone()
                .expect("acceleration structure is not materialised"),
            _ => panic!("handle does not name an acceleration structure"),
        }
    }

    fn pool_buffer(&self, handle: BufferHandle) -> &PoolBuffer {
        match &self.graph[handle.0] {
            Node::Buffer(node) => node.buffer.as_ref().expect("buffer is not materialised"),
            _ => panic!("handle does not name a buffer"),
        }
    }

    fn pool_texture(&self, handle: TextureHandle) -> &PoolTexture {
        match &self.graph[handle.0] {
            Node::Texture(node) => node.texture.as_ref().expect("texture is not materialised"),
            _ => panic!("handle does not name a texture"),
        }
    }

    /// Extracts the pooled buffer behind `handle` from the graph; the node
    /// chain becomes imported and the pool slot is rebacked on next use.
    pub fn take_buffer(&mut self, handle: BufferHandle) -> Option<Rc<Buffer>> {
        let (desc, entry) = match &mut self.graph[handle.0] {
            Node::Buffer(node) => {
                if node.imported {
                    return None;
                }
                node.imported = true;
                (node.desc.clone(), node.buffer.clone()?)
            }
            _ => return None,
        };
        self.pools.take_buffer(&desc, entry.index)
    }

    pub fn take_texture(&mut self, handle: TextureHandle) -> Option<Rc<Texture>> {
        let (desc, entry) = match &mut self.graph[handle.0] {
            Node::Texture(node) => {
                if node.imported {
                    return None;
                }
                node.imported = true;
                (node.desc.clone(), node.texture.clone()?)
            }
            _ => return None,
        };
        self.pools.take_texture(&desc, entry.index)
    }

    pub fn set_command_encoder(&mut self, encoder: Box<dyn rhi::CommandEncoder>) {
        *self.cmd_encoder.borrow_mut() = Some(encoder);
    }

    pub fn take_command_encoder(&mut self) -> Option<Box<dyn rhi::CommandEncoder>> {
        self.cmd_encoder.borrow_mut().take()
    }

    //----------------------------------------------------------------------------------------------
    // Compilation

    fn compile(&mut self) {
        let node_count = self.graph.node_count();
        self.graph_order.clear();
        self.resources_to_create = vec![Vec::new(); node_count];
        self.resources_to_destroy = vec![Vec::new(); node_count];

        let present = match self.present_pass {
            Some(present) => present,
            None => {
                log::warn!(target: "graph", "render graph has no present pass");
                self.invalid = true;
                return;
            }
        };

        // cull: everything not reaching the present pass is dead, except that
        // a live pass keeps its resource outputs alive
        let mut used = vec![false; node_count];
        let mut queue = VecDeque::new();
        used[present.index()] = true;
        queue.push_back(present);
        while let Some(n) = queue.pop_front() {
            for m in self.graph.neighbors_directed(n, Direction::Incoming) {
                if !used[m.index()] {
                    used[m.index()] = true;
                    queue.push_back(m);
                }
            }
        }
        let node_indices: Vec<GraphIndex> = self.graph.node_indices().collect();
        for &n in &node_indices {
            if used[n.index()] && self.graph[n].is_pass() {
                for m in self.graph.neighbors_directed(n, Direction::Outgoing) {
                    used[m.index()] = true;
                }
            }
        }

        // Kahn's algorithm over live nodes only
        let mut in_degrees = vec![0usize; node_count];
        let mut queue = VecDeque::new();
        for &n in &node_indices {
            if !used[n.index()] {
                continue;
            }
            let degree = self
                .graph
                .neighbors_directed(n, Direction::Incoming)
                .filter(|m| used[m.index()])
                .count();
            in_degrees[n.index()] = degree;
            if degree == 0 {
                queue.push_back(n);
            }
        }
        let mut order_of = vec![0usize; node_count];
        while let Some(n) = queue.pop_front() {
            order_of[n.index()] = self.graph_order.len();
            self.graph_order.push(n);
            for m in self.graph.neighbors_directed(n, Direction::Outgoing) {
                if used[m.index()] {
                    in_degrees[m.index()] -= 1;
                    if in_degrees[m.index()] == 0 {
                        queue.push_back(m);
                    }
                }
            }
        }

        for &n in &node_indices {
            if used[n.index()] && in_degrees[n.index()] > 0 {
                log::warn!(target: "graph", "found cycle in render graph");
                self.invalid = true;
                return;
            }
        }

        // resource lifetimes: created at the first adjacent pass, destroyed
        // at the last
        for &n in &node_indices {
            if !used[n.index()] || !self.graph[n].is_resource() {
                continue;
            }
            let mut start = usize::max_value();
            let mut end = 0usize;
            for direction in &[Direction::Incoming, Direction::Outgoing] {
                for m in self.graph.neighbors_directed(n, *direction) {
                    if used[m.index()] {
                        start = start.min(order_of[m.index()]);
                        end = end.max(order_of[m.index()]);
                    }
                }
            }
            if start == usize::max_value() {
                continue;
            }
            self.resources_to_create[start].push(n);
            self.resources_to_destroy[end].push(n);
        }
    }

    //----------------------------------------------------------------------------------------------
    // Execution

    /// Compiles and executes the graph, then clears the builder state.
    /// Returns false when the graph was invalid and nothing was recorded.
    pub fn execute(&mut self, res: &mut ExecResources<'_>) -> bool {
        self.compile();
        if self.invalid {
            self.clear();
            return false;
        }

        for order in 0..self.graph_order.len() {
            let to_create = self.resources_to_create[order].clone();
            for resource in to_create {
                self.create_resource(resource);
            }

            let index = self.graph_order[order];
            self.set_barriers(index);
            self.execute_node(index, res);

            let to_destroy = self.resources_to_destroy[order].clone();
            for resource in to_destroy {
                self.destroy_resource(resource);
            }
        }

        self.clear();
        true
    }

    fn create_resource(&mut self, index: GraphIndex) {
        // an alias chain member inherits the predecessor's allocation; the
        // imported flag may have flipped if the resource was taken out of
        // the graph
        enum Inherited {
            Buffer(Option<PoolBuffer>, bool),
            Texture(Option<PoolTexture>, bool),
            Nothing,
        }
        let inherited = match &self.graph[index] {
            Node::Buffer(node) => match node.prev_alias {
                Some(prev) => match &self.graph[prev] {
                    Node::Buffer(prev_node) => {
                        Inherited::Buffer(prev_node.buffer.clone(), prev_node.imported)
                    }
                    _ => Inherited::Nothing,
                },
                None => Inherited::Nothing,
            },
            Node::Texture(node) => match node.prev_alias {
                Some(prev) => match &self.graph[prev] {
                    Node::Texture(prev_node) => {
                        Inherited::Texture(prev_node.texture.clone(), prev_node.imported)
                    }
                    _ => Inherited::Nothing,
                },
                None => Inherited::Nothing,
            },
            _ => Inherited::Nothing,
        };

        let RenderGraph {
            graph, pools, ctx, ..
        } = self;
        match &mut graph[index] {
            Node::Buffer(node) => {
                if let Inherited::Buffer(buffer, imported) = inherited {
                    node.buffer = buffer;
                    node.imported = imported;
                }
                if node.buffer.is_none() {
                    let (buffer, pool_index, access) = pools.acquire_buffer(ctx, &node.desc);
                    node.buffer = Some(PoolBuffer {
                        buffer,
                        index: pool_index,
                        access: Rc::new(Cell::new(access)),
                    });
                }
            }
            Node::Texture(node) => {
                if let Inherited::Texture(texture, imported) = inherited {
                    node.texture = texture;
                    node.imported = imported;
                }
                if node.texture.is_none() {
                    let (texture, pool_index, access) = pools.acquire_texture(ctx, &node.desc);
                    node.texture = Some(PoolTexture {
                        texture,
                        index: pool_index,
                        access: Rc::new(Cell::new(access)),
                    });
                }
            }
            Node::AccelerationStructure(node) => {
                if node.accel.is_none() {
                    node.accel = Some(Rc::new(AccelerationStructure::new(ctx, &node.desc)));
                }
            }
            _ => {}
        }
    }

    fn destroy_resource(&mut self, index: GraphIndex) {
        let RenderGraph { graph, pools, .. } = self;
        match &mut graph[index] {
            Node::Buffer(node) => {
                if !node.imported && node.next_alias.is_none() {
                    if let Some(entry) = node.buffer.take() {
                        pools.release_buffer(&node.desc, entry.index, entry.access.get());
                    }
                }
            }
            Node::Texture(node) => {
                if !node.imported && node.next_alias.is_none() {
                    if let Some(entry) = node.texture.take() {
                        pools.release_texture(&node.desc, entry.index, entry.access.get());
                    }
                }
            }
            Node::AccelerationStructure(node) => {
                node.accel = None;
            }
            _ => {}
        }
    }

    //----------------------------------------------------------------------------------------------
    // Barriers

    fn buffer_read_target_access(&self, handle: BufferHandle) -> rhi::ResourceAccess {
        let usages = self.pool_buffer(handle).buffer.desc().usages;
        if usages.contains(rhi::BufferUsage::UNIFORM) {
            rhi::ResourceAccess::UNIFORM_BUFFER_READ
        } else if usages.contains(rhi::BufferUsage::INDIRECT) {
            rhi::ResourceAccess::INDIRECT_READ
        } else if usages.contains(rhi::BufferUsage::STORAGE_READ) {
            // storage read only when the buffer cannot be read another way
            rhi::ResourceAccess::STORAGE_READ
        } else {
            rhi::ResourceAccess::NONE
        }
    }

    fn texture_read_target_access(&self, handle: TextureHandle) -> rhi::ResourceAccess {
        let usages = self.pool_texture(handle).texture.desc().usages;
        if usages.contains(rhi::TextureUsage::SAMPLED) {
            rhi::ResourceAccess::SAMPLED_TEXTURE_READ
        } else if usages.contains(rhi::TextureUsage::STORAGE_READ) {
            rhi::ResourceAccess::STORAGE_READ
        } else {
            rhi::ResourceAccess::NONE
        }
    }

    fn plan_buffer_transition(
        &self,
        handle: BufferHandle,
        target: rhi::ResourceAccess,
        out: &mut Vec<PendingBufferBarrier>,
    ) {
        if target.is_empty() {
            return;
        }
        let entry = self.pool_buffer(handle);
        if need_barrier(entry.access.get(), target) {
            out.push(PendingBufferBarrier {
                buffer: entry.buffer.clone(),
                src_access: entry.access.get(),
                dst_access: target,
            });
            entry.access.set(target);
        }
    }

    fn plan_texture_transition(
        &self,
        handle: TextureHandle,
        target: rhi::ResourceAccess,
        out: &mut Vec<PendingTextureBarrier>,
    ) {
        if target.is_empty() {
            return;
        }
        let entry = self.pool_texture(handle);
        if need_barrier(entry.access.get(), target) {
            out.push(PendingTextureBarrier {
                texture: entry.texture.clone(),
                src_access: entry.access.get(),
                dst_access: target,
            });
            entry.access.set(target);
        }
    }

    fn plan_shader_barriers(
        &self,
        read_buffers: &[BufferHandle],
        write_buffers: &[BufferHandle],
        read_textures: &[TextureHandle],
        write_textures: &[TextureHandle],
        buffer_barriers: &mut Vec<PendingBufferBarrier>,
        texture_barriers: &mut Vec<PendingTextureBarrier>,
    ) {
        for &handle in read_buffers {
            let target = self.buffer_read_target_access(handle);
            self.plan_buffer_transition(handle, target, buffer_barriers);
        }
        for &handle in read_textures {
            let target = self.texture_read_target_access(handle);
            self.plan_texture_transition(handle, target, texture_barriers);
        }
        for &handle in write_buffers {
            let usages = self.pool_buffer(handle).buffer.desc().usages;
            if usages.contains(rhi::BufferUsage::STORAGE_READ_WRITE) {
                self.plan_buffer_transition(
                    handle,
                    rhi::ResourceAccess::STORAGE_WRITE,
                    buffer_barriers,
                );
            }
        }
        for &handle in write_textures {
            let usages = self.pool_texture(handle).texture.desc().usages;
            if usages.contains(rhi::TextureUsage::STORAGE_READ_WRITE) {
                self.plan_texture_transition(
                    handle,
                    rhi::ResourceAccess::STORAGE_WRITE,
                    texture_barriers,
                );
            }
        }
    }

    fn set_barriers(&self, index: GraphIndex) {
        let mut buffer_barriers = Vec::new();
        let mut texture_barriers = Vec::new();

        match &self.graph[index] {
            Node::GraphicsPass(node) => {
                self.plan_shader_barriers(
                    &node.read_buffers,
                    &node.write_buffers,
                    &node.read_textures,
                    &node.write_textures,
                    &mut buffer_barriers,
                    &mut texture_barriers,
                );
                for target in node.color_targets.iter().flatten() {
                    self.plan_texture_transition(
                        target.handle,
                        rhi::ResourceAccess::COLOR_ATTACHMENT_WRITE,
                        &mut texture_barriers,
                    );
                }
                if let Some(target) = &node.depth_stencil_target {
                    let access = if target.read_only {
                        rhi::ResourceAccess::DEPTH_STENCIL_READ
                    } else {
                        rhi::ResourceAccess::DEPTH_STENCIL_WRITE
                    };
                    self.plan_texture_transition(target.handle, access, &mut texture_barriers);
                }
            }
            Node::ComputePass(node) => {
                self.plan_shader_barriers(
                    &node.read_buffers,
                    &node.write_buffers,
                    &node.read_textures,
                    &node.write_textures,
                    &mut buffer_barriers,
                    &mut texture_barriers,
                );
            }
            Node::BlitPass(node) => {
                self.plan_texture_transition(
                    node.src,
                    rhi::ResourceAccess::SAMPLED_TEXTURE_READ,
                    &mut texture_barriers,
                );
                let dst_access = if self.pool_texture(node.dst).texture.desc().format.is_depth_stencil()
                {
                    rhi::ResourceAccess::DEPTH_STENCIL_WRITE
                } else {
                    rhi::ResourceAccess::COLOR_ATTACHMENT_WRITE
                };
                self.plan_texture_transition(node.dst, dst_access, &mut texture_barriers);
            }
            Node::PresentPass(node) => {
                self.plan_texture_transition(
                    node.texture,
                    rhi::ResourceAccess::SAMPLED_TEXTURE_READ,
                    &mut texture_barriers,
                );
            }
            _ => {}
        }

        if buffer_barriers.is_empty() && texture_barriers.is_empty() {
            return;
        }

        let rhi_buffer_barriers: Vec<rhi::BufferBarrier<'_>> = buffer_barriers
            .iter()
            .map(|pending| rhi::BufferBarrier {
                buffer: pending.buffer.rhi_buffer(),
                src_access: pending.src_access,
                dst_access: pending.dst_access,
            })
            .collect();
        let rhi_texture_barriers: Vec<rhi::TextureBarrier<'_>> = texture_barriers
            .iter()
            .map(|pending| {
                rhi::TextureBarrier::whole(
                    pending.texture.rhi_texture(),
                    pending.src_access,
                    pending.dst_access,
                )
            })
            .collect();
        let mut encoder = self.cmd_encoder.borrow_mut();
        encoder
            .as_mut()
            .expect("no command encoder bound to the render graph")
            .resource_barriers(&rhi_buffer_barriers, &rhi_texture_barriers);
    }

    //----------------------------------------------------------------------------------------------
    // Node execution

    fn execute_node(&mut self, index: GraphIndex, res: &mut ExecResources<'_>) {
        enum Taken {
            Graphics {
                name: String,
                color_targets: Vec<Option<ColorTarget>>,
                depth_stencil_target: Option<DepthStencilTarget>,
                pass_data: Box<dyn Any>,
                execute_fn: GraphicsExecuteFn,
            },
            Compute {
                name: String,
                pass_data: Box<dyn Any>,
                execute_fn: ComputeExecuteFn,
            },
            Blit {
                src: TextureHandle,
                src_mip_level: u32,
                src_array_layer: u32,
                dst: TextureHandle,
                dst_mip_level: u32,
                dst_array_layer: u32,
                mode: BlitPassMode,
            },
            Nothing,
        }

        let taken = match &mut self.graph[index] {
            Node::GraphicsPass(node) => {
                match (node.pass_data.take(), node.execute_fn.take()) {
                    (Some(pass_data), Some(execute_fn)) => Taken::Graphics {
                        name: node.name.clone(),
                        color_targets: node.color_targets.clone(),
                        depth_stencil_target: node.depth_stencil_target.clone(),
                        pass_data,
                        execute_fn,
                    },
                    _ => Taken::Nothing,
                }
            }
            Node::ComputePass(node) => match (node.pass_data.take(), node.execute_fn.take()) {
                (Some(pass_data), Some(execute_fn)) => Taken::Compute {
                    name: node.name.clone(),
                    pass_data,
                    execute_fn,
                },
                _ => Taken::Nothing,
            },
            Node::BlitPass(node) => Taken::Blit {
                src: node.src,
                src_mip_level: node.src_mip_level,
                src_array_layer: node.src_array_layer,
                dst: node.dst,
                dst_mip_level: node.dst_mip_level,
                dst_array_layer: node.dst_array_layer,
                mode: node.mode,
            },
            _ => Taken::Nothing,
        };

        match taken {
            Taken::Graphics {
                name,
                color_targets,
                depth_stencil_target,
                pass_data,
                execute_fn,
            } => self.execute_graphics_pass(
                &name,
                &color_targets,
                depth_stencil_target.as_ref(),
                pass_data,
                execute_fn,
                res,
            ),
            Taken::Compute {
                name,
                pass_data,
                execute_fn,
            } => {
                let mut encoder_slot = self.cmd_encoder.borrow_mut();
                let cmd = encoder_slot
                    .as_mut()
                    .expect("no command encoder bound to the render graph");
                let mut compute_encoder =
                    cmd.begin_compute_pass(rhi::CommandLabel::new(name, [1.0, 0.0, 0.0]));
                let mut pass_ctx = ComputePassContext {
                    graph: self,
                    encoder: &mut *compute_encoder,
                    res,
                    binding: ResourceBindingContext::new(),
                };
                execute_fn(&*pass_data, &mut pass_ctx);
            }
            Taken::Blit {
                src,
                src_mip_level,
                src_array_layer,
                dst,
                dst_mip_level,
                dst_array_layer,
                mode,
            } => {
                let src_texture = self.texture(src);
                let dst_texture = self.texture(dst);
                let mut encoder_slot = self.cmd_encoder.borrow_mut();
                let cmd = encoder_slot
                    .as_mut()
                    .expect("no command encoder bound to the render graph");
                match mode {
                    BlitPassMode::Normal => res.blit_2d(
                        &mut **cmd,
                        &src_texture,
                        src_mip_level,
                        src_array_layer,
                        &dst_texture,
                        dst_mip_level,
                        dst_array_layer,
                    ),
                }
            }
            Taken::Nothing => {}
        }
    }

    fn execute_graphics_pass(
        &self,
        name: &str,
        color_targets: &[Option<ColorTarget>],
        depth_stencil_target: Option<&DepthStencilTarget>,
        pass_data: Box<dyn Any>,
        execute_fn: GraphicsExecuteFn,
        res: &mut ExecResources<'_>,
    ) {
        struct KeptColor {
            texture: Rc<Texture>,
            target: ColorTarget,
        }

        let mut rt_width = 0;
        let mut rt_height = 0;
        let mut color_formats = Vec::new();
        let mut depth_stencil_format = rhi::ResourceFormat::Undefined;

        let mut kept_colors: Vec<KeptColor> = Vec::new();
        for target in color_targets {
            let target = match target {
                Some(target) => target.clone(),
                None => break,
            };
            let texture = self.texture(target.handle);
            if rt_width == 0 {
                rt_width = texture.desc().extent.width;
                rt_height = texture.desc().extent.height;
            }
            color_formats.push(texture.desc().format);
            kept_colors.push(KeptColor { texture, target });
        }
        let kept_depth = depth_stencil_target.map(|target| {
            let texture = self.texture(target.handle);
            if rt_width == 0 {
                rt_width = texture.desc().extent.width;
                rt_height = texture.desc().extent.height;
            }
            depth_stencil_format = texture.desc().format;
            (texture, target.clone())
        });

        if rt_width == 0 {
            return;
        }

        let rt_desc = rhi::RenderTargetDesc {
            colors: kept_colors
                .iter()
                .map(|kept| rhi::ColorAttachmentDesc {
                    texture: rhi::TextureViewRef {
                        texture: kept.texture.rhi_texture(),
                        mip_level: kept.target.level,
                        base_layer: kept.target.base_layer,
                        num_layers: kept.target.num_layers,
                    },
                    clear_color: kept.target.clear_color,
                    store: kept.target.store,
                })
                .collect(),
            depth_stencil: kept_depth.as_ref().map(|(texture, target)| {
                rhi::DepthStencilAttachmentDesc {
                    texture: rhi::TextureViewRef {
                        texture: texture.rhi_texture(),
                        mip_level: target.level,
                        base_layer: target.base_layer,
                        num_layers: target.num_layers,
                    },
                    clear_value: target.clear_value,
                    store: target.store,
                    read_only: target.read_only,
                }
            }),
        };

        {
            let mut encoder_slot = self.cmd_encoder.borrow_mut();
            let cmd = encoder_slot
                .as_mut()
                .expect("no command encoder bound to the render graph");
            let mut graphics_encoder = cmd.begin_render_pass(
                rhi::CommandLabel::new(name.to_string(), [0.0, 0.0, 1.0]),
                &rt_desc,
            );
            graphics_encoder.set_viewports(&[rhi::Viewport {
                x: 0.0,
                y: 0.0,
                width: rt_width as f32,
                height: rt_height as f32,
                min_depth: 0.0,
                max_depth: 1.0,
            }]);
            graphics_encoder.set_scissors(&[rhi::Scissor {
                x: 0,
                y: 0,
                width: rt_width,
                height: rt_height,
            }]);

            let mut pass_ctx = GraphicsPassContext {
                graph: self,
                encoder: &mut *graphics_encoder,
                res,
                color_formats,
                depth_stencil_format,
                binding: ResourceBindingContext::new(),
            };
            execute_fn(&*pass_data, &mut pass_ctx);
        }

        // post-pass mipmap generation for targets that requested it
        for kept in &kept_colors {
            if kept.target.generate_mipmaps {
                self.generate_target_mipmaps(kept.target.handle, &kept.texture, res);
            }
        }
        if let Some((texture, target)) = &kept_depth {
            if target.generate_mipmaps {
                self.generate_target_mipmaps(target.handle, texture, res);
            }
        }
    }

    fn generate_target_mipmaps(
        &self,
        handle: TextureHandle,
        texture: &Rc<Texture>,
        res: &mut ExecResources<'_>,
    ) {
        let access_cell = self.pool_texture(handle).access.clone();
        let mut access = access_cell.get();
        let mut encoder_slot = self.cmd_encoder.borrow_mut();
        let cmd = encoder_slot
            .as_mut()
            .expect("no command encoder bound to the render graph");
        res.generate_mipmaps_2d(
            &mut **cmd,
            texture,
            &mut access,
            crate::commands::MipmapMode::Average,
        );
        access_cell.set(access);
    }

    //----------------------------------------------------------------------------------------------

    /// Clears builder state; pooled resources are kept for later frames.
    pub fn clear(&mut self) {
        self.graph.clear();
        self.present_pass = None;
        self.back_buffer = None;
        self.imported_buffers.clear();
        self.imported_textures.clear();
        self.graph_order.clear();
        self.resources_to_create.clear();
        self.resources_to_destroy.clear();
        self.invalid = false;
        self.rendered_object_lists.clear();
    }
}

//--------------------------------------------------------------------------------------------------

impl RenderGraph {
    pub fn num_rendered_object_lists(&self) -> usize {
        self.rendered_object_lists.len()
    }
}
