use kgraph::{DType, DeviceBuffer, Layout, TensorDesc, TensorValue, VariantPack};

/// Base address of the workspace handed out by [`workspace`].
pub const WORKSPACE_BASE: u64 = 0x8000_0000;

const TENSOR_BASE: u64 = 0x1000_0000;
const TENSOR_ALIGN: u64 = 256;

/// Installs a test-writer subscriber once; `RUST_LOG` picks the level.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub fn f32_desc(dims: &[usize]) -> TensorDesc {
    TensorDesc::natural(DType::F32, dims)
}

pub fn packed_desc(dtype: DType, logical: &[usize]) -> TensorDesc {
    let dims = kgraph::tensor::layout::packed_dims(logical).expect("packable dims");
    TensorDesc::new(dtype, dims.as_slice(), Layout::Packed)
}

pub fn workspace(bytes: usize) -> DeviceBuffer {
    DeviceBuffer::new(WORKSPACE_BASE, bytes)
}

/// Binds descriptors to distinct, exactly sized fake device buffers.
#[derive(Debug)]
pub struct PackBuilder {
    next_addr: u64,
    inputs: Vec<TensorValue>,
    outputs: Vec<TensorValue>,
}

impl Default for PackBuilder {
    fn default() -> Self {
        Self {
            next_addr: TENSOR_BASE,
            inputs: Vec::new(),
            outputs: Vec::new(),
        }
    }
}

impl PackBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    fn bind(&mut self, desc: TensorDesc) -> TensorValue {
        let len = desc.storage_bytes().expect("tensor size fits usize");
        let buffer = DeviceBuffer::new(self.next_addr, len);
        let advance = (len as u64).div_ceil(TENSOR_ALIGN).max(1) * TENSOR_ALIGN;
        self.next_addr += advance;
        TensorValue::new(desc, buffer)
    }

    pub fn input(mut self, desc: TensorDesc) -> Self {
        let value = self.bind(desc);
        self.inputs.push(value);
        self
    }

    pub fn output(mut self, desc: TensorDesc) -> Self {
        let value = self.bind(desc);
        self.outputs.push(value);
        self
    }

    pub fn build(self) -> VariantPack {
        VariantPack::new(self.inputs, self.outputs)
    }
}
