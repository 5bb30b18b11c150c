//! Plain descriptor types shared between the frame graph and backends

use bitflags::bitflags;

/// Image format enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ImageFormat {
    Rgba8Unorm,
    Rgba8UnormSrgb,
    Bgra8Unorm,
    Bgra8UnormSrgb,
    Rgba16Float,
    Rgba32Float,
    R11G11B10Float,
    R16Float,
    R32Float,
    Rg16Float,
    Rg32Float,
    R32Uint,
    Depth32Float,
    Depth24PlusStencil8,
}

impl ImageFormat {
    pub fn is_depth(&self) -> bool {
        matches!(
            self,
            ImageFormat::Depth32Float | ImageFormat::Depth24PlusStencil8
        )
    }

    pub fn bytes_per_pixel(&self) -> u32 {
        match self {
            ImageFormat::R16Float => 2,
            ImageFormat::Rgba8Unorm
            | ImageFormat::Rgba8UnormSrgb
            | ImageFormat::Bgra8Unorm
            | ImageFormat::Bgra8UnormSrgb
            | ImageFormat::R11G11B10Float
            | ImageFormat::R32Float
            | ImageFormat::Rg16Float
            | ImageFormat::R32Uint
            | ImageFormat::Depth32Float
            | ImageFormat::Depth24PlusStencil8 => 4,
            ImageFormat::Rgba16Float | ImageFormat::Rg32Float => 8,
            ImageFormat::Rgba32Float => 16,
        }
    }
}

bitflags! {
    /// How a resource may be bound to the pipeline.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct BindFlags: u32 {
        const SHADER_RESOURCE = 1 << 0;
        const RENDER_TARGET = 1 << 1;
        const DEPTH_STENCIL = 1 << 2;
        const UNORDERED_ACCESS = 1 << 3;
        const CONSTANT_BUFFER = 1 << 4;
        const VERTEX_BUFFER = 1 << 5;
        const INDEX_BUFFER = 1 << 6;
        const INDIRECT_ARGUMENTS = 1 << 7;
        const COPY_SOURCE = 1 << 8;
        const COPY_DEST = 1 << 9;
    }
}

/// CPU/GPU access pattern requested for a resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum UsageClass {
    /// Immutable after creation.
    Static,
    /// Rewritten by the CPU every frame.
    Dynamic,
    /// GPU read/write only.
    #[default]
    Default,
    /// CPU-visible upload/readback memory.
    Staging,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ImageDimension {
    Image1D,
    #[default]
    Image2D,
    Image3D,
    ImageCube,
}

/// Image descriptor
#[derive(Debug, Clone, PartialEq)]
pub struct ImageDesc {
    pub label: Option<String>,
    pub dimension: ImageDimension,
    pub width: u32,
    pub height: u32,
    /// Depth for 3D images, layer count otherwise.
    pub depth_or_array_size: u32,
    pub mip_count: u32,
    pub sample_count: u32,
    pub format: ImageFormat,
    pub bind_flags: BindFlags,
    pub usage: UsageClass,
}

impl Default for ImageDesc {
    fn default() -> Self {
        Self {
            label: None,
            dimension: ImageDimension::Image2D,
            width: 1,
            height: 1,
            depth_or_array_size: 1,
            mip_count: 1,
            sample_count: 1,
            format: ImageFormat::Rgba8Unorm,
            bind_flags: BindFlags::SHADER_RESOURCE,
            usage: UsageClass::Default,
        }
    }
}

impl ImageDesc {
    /// A single-mip 2D image.
    pub fn new_2d(width: u32, height: u32, format: ImageFormat, bind_flags: BindFlags) -> Self {
        Self {
            width,
            height,
            format,
            bind_flags,
            ..Default::default()
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn with_mips(mut self, mip_count: u32) -> Self {
        self.mip_count = mip_count;
        self
    }

    pub fn with_samples(mut self, sample_count: u32) -> Self {
        self.sample_count = sample_count;
        self
    }

    /// Rough size in bytes, ignoring backend alignment.
    pub fn approximate_size(&self) -> u64 {
        let mut total = 0u64;
        let (mut w, mut h) = (self.width as u64, self.height as u64);
        for _ in 0..self.mip_count.max(1) {
            total += w * h;
            w = (w / 2).max(1);
            h = (h / 2).max(1);
        }
        total
            * self.depth_or_array_size.max(1) as u64
            * self.sample_count.max(1) as u64
            * self.format.bytes_per_pixel() as u64
    }
}

/// Buffer descriptor
#[derive(Debug, Clone, PartialEq)]
pub struct BufferDesc {
    pub label: Option<String>,
    pub size: u64,
    /// Element stride for structured buffers, 0 for raw buffers.
    pub stride: u32,
    pub bind_flags: BindFlags,
    pub usage: UsageClass,
}

impl Default for BufferDesc {
    fn default() -> Self {
        Self {
            label: None,
            size: 0,
            stride: 0,
            bind_flags: BindFlags::SHADER_RESOURCE,
            usage: UsageClass::Default,
        }
    }
}

impl BufferDesc {
    pub fn new(size: u64, bind_flags: BindFlags) -> Self {
        Self {
            size,
            bind_flags,
            ..Default::default()
        }
    }

    pub fn structured(element_count: u64, stride: u32, bind_flags: BindFlags) -> Self {
        Self {
            size: element_count * stride as u64,
            stride,
            bind_flags,
            ..Default::default()
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn with_usage(mut self, usage: UsageClass) -> Self {
        self.usage = usage;
        self
    }
}

/// Hardware queue a pass is submitted to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum QueueType {
    Graphics,
    AsyncCompute,
}

impl QueueType {
    pub const COUNT: usize = 2;

    pub fn index(self) -> usize {
        match self {
            QueueType::Graphics => 0,
            QueueType::AsyncCompute => 1,
        }
    }
}

/// Viewport rectangle in pixels
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub min_depth: f32,
    pub max_depth: f32,
}

impl Viewport {
    pub fn new(width: f32, height: f32) -> Self {
        Self {
            x: 0.0,
            y: 0.0,
            width,
            height,
            min_depth: 0.0,
            max_depth: 1.0,
        }
    }
}

/// Scissor rectangle in pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScissorRegion {
    pub left: i32,
    pub top: i32,
    pub right: i32,
    pub bottom: i32,
}

impl ScissorRegion {
    pub fn from_size(width: u32, height: u32) -> Self {
        Self {
            left: 0,
            top: 0,
            right: width as i32,
            bottom: height as i32,
        }
    }
}

/// Primitive topology
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PrimitiveTopology {
    PointList,
    LineList,
    LineStrip,
    TriangleList,
    TriangleStrip,
}

/// Cull mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CullMode {
    None,
    Front,
    Back,
}

/// Compare function for depth tests
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CompareFunction {
    Never,
    Less,
    Equal,
    LessEqual,
    Greater,
    NotEqual,
    GreaterEqual,
    Always,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DepthStencilState {
    pub format: ImageFormat,
    pub depth_write_enabled: bool,
    pub depth_compare: CompareFunction,
}

/// Shader stages of a pipeline state
#[derive(Debug, Clone, PartialEq)]
pub enum PipelineStages {
    Graphics {
        vertex_shader: String,
        pixel_shader: Option<String>,
    },
    Compute {
        shader: String,
        entry_point: String,
    },
}

/// Pipeline state descriptor
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineStateDesc {
    pub label: Option<String>,
    pub stages: PipelineStages,
    pub primitive_topology: PrimitiveTopology,
    pub cull_mode: CullMode,
    pub color_formats: Vec<ImageFormat>,
    pub depth_stencil: Option<DepthStencilState>,
    pub sample_count: u32,
}

impl PipelineStateDesc {
    pub fn compute(label: &str, shader: impl Into<String>, entry_point: impl Into<String>) -> Self {
        Self {
            label: Some(label.to_string()),
            stages: PipelineStages::Compute {
                shader: shader.into(),
                entry_point: entry_point.into(),
            },
            primitive_topology: PrimitiveTopology::TriangleList,
            cull_mode: CullMode::None,
            color_formats: Vec::new(),
            depth_stencil: None,
            sample_count: 1,
        }
    }

    pub fn is_compute(&self) -> bool {
        matches!(self.stages, PipelineStages::Compute { .. })
    }
}
