//! ResNet Backbone and Classification Head
//!
//! The torchvision ResNet layout (basic blocks for depths 18/34, bottleneck
//! blocks for 50/101) so that ImageNet checkpoints map onto it parameter by
//! parameter. The forward pass returns raw logits.

use core::f64::consts::SQRT_2;

use burn::{
    module::Module,
    nn::{
        conv::{Conv2d, Conv2dConfig},
        pool::{AdaptiveAvgPool2d, AdaptiveAvgPool2dConfig, MaxPool2d, MaxPool2dConfig},
        BatchNorm, BatchNormConfig, Initializer, Linear, LinearConfig, PaddingConfig2d, Relu,
    },
    tensor::{backend::Backend, Tensor},
};

use super::config::{Arch, ResNetConfig};

/// Channel widths of the four stages before expansion
const STAGE_PLANES: [usize; 4] = [64, 128, 256, 512];

/// Width of the stem convolution
const STEM_CHANNELS: usize = 64;

/// Named parameter shapes, in module order
pub type ParameterShapes = Vec<(String, Vec<usize>)>;

fn conv(channels: [usize; 2], kernel: usize, stride: usize, padding: usize) -> Conv2dConfig {
    Conv2dConfig::new(channels, [kernel, kernel])
        .with_stride([stride, stride])
        .with_padding(PaddingConfig2d::Explicit(padding, padding))
        .with_bias(false)
        .with_initializer(Initializer::KaimingNormal {
            gain: SQRT_2,
            fan_out_only: true,
        })
}

fn conv_shapes<B: Backend>(prefix: &str, conv: &Conv2d<B>, out: &mut ParameterShapes) {
    out.push((format!("{prefix}.weight"), conv.weight.dims().to_vec()));
    if let Some(bias) = &conv.bias {
        out.push((format!("{prefix}.bias"), bias.dims().to_vec()));
    }
}

fn bn_shapes<B: Backend>(prefix: &str, bn: &BatchNorm<B>, out: &mut ParameterShapes) {
    out.push((format!("{prefix}.gamma"), bn.gamma.dims().to_vec()));
    out.push((format!("{prefix}.beta"), bn.beta.dims().to_vec()));
    out.push((
        format!("{prefix}.running_mean"),
        bn.running_mean.value().dims().to_vec(),
    ));
    out.push((
        format!("{prefix}.running_var"),
        bn.running_var.value().dims().to_vec(),
    ));
}

/// 1x1 projection used when a block changes resolution or width
#[derive(Module, Debug)]
pub struct Downsample<B: Backend> {
    pub conv: Conv2d<B>,
    pub bn: BatchNorm<B>,
}

impl<B: Backend> Downsample<B> {
    pub fn new(in_channels: usize, out_channels: usize, stride: usize, device: &B::Device) -> Self {
        Self {
            conv: conv([in_channels, out_channels], 1, stride, 0).init(device),
            bn: BatchNormConfig::new(out_channels).init(device),
        }
    }

    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        self.bn.forward(self.conv.forward(x))
    }

    fn shapes(&self, prefix: &str, out: &mut ParameterShapes) {
        conv_shapes(&format!("{prefix}.conv"), &self.conv, out);
        bn_shapes(&format!("{prefix}.bn"), &self.bn, out);
    }
}

/// Two 3x3 convolutions with an identity shortcut
#[derive(Module, Debug)]
pub struct BasicBlock<B: Backend> {
    pub conv1: Conv2d<B>,
    pub bn1: BatchNorm<B>,
    pub relu: Relu,
    pub conv2: Conv2d<B>,
    pub bn2: BatchNorm<B>,
    pub downsample: Option<Downsample<B>>,
}

impl<B: Backend> BasicBlock<B> {
    pub const EXPANSION: usize = 1;

    pub fn new(in_channels: usize, planes: usize, stride: usize, device: &B::Device) -> Self {
        let out_channels = planes * Self::EXPANSION;
        let downsample = (stride != 1 || in_channels != out_channels)
            .then(|| Downsample::new(in_channels, out_channels, stride, device));

        Self {
            conv1: conv([in_channels, planes], 3, stride, 1).init(device),
            bn1: BatchNormConfig::new(planes).init(device),
            relu: Relu::new(),
            conv2: conv([planes, planes], 3, 1, 1).init(device),
            bn2: BatchNormConfig::new(planes).init(device),
            downsample,
        }
    }

    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let identity = match &self.downsample {
            Some(downsample) => downsample.forward(x.clone()),
            None => x.clone(),
        };

        let out = self.relu.forward(self.bn1.forward(self.conv1.forward(x)));
        let out = self.bn2.forward(self.conv2.forward(out));

        self.relu.forward(out + identity)
    }

    fn shapes(&self, prefix: &str, out: &mut ParameterShapes) {
        conv_shapes(&format!("{prefix}.conv1"), &self.conv1, out);
        bn_shapes(&format!("{prefix}.bn1"), &self.bn1, out);
        conv_shapes(&format!("{prefix}.conv2"), &self.conv2, out);
        bn_shapes(&format!("{prefix}.bn2"), &self.bn2, out);
        if let Some(downsample) = &self.downsample {
            downsample.shapes(&format!("{prefix}.downsample"), out);
        }
    }
}

/// 1x1 reduce, 3x3 (strided), 1x1 expand
#[derive(Module, Debug)]
pub struct Bottleneck<B: Backend> {
    pub conv1: Conv2d<B>,
    pub bn1: BatchNorm<B>,
    pub relu: Relu,
    pub conv2: Conv2d<B>,
    pub bn2: BatchNorm<B>,
    pub conv3: Conv2d<B>,
    pub bn3: BatchNorm<B>,
    pub downsample: Option<Downsample<B>>,
}

impl<B: Backend> Bottleneck<B> {
    pub const EXPANSION: usize = 4;

    pub fn new(in_channels: usize, planes: usize, stride: usize, device: &B::Device) -> Self {
        let out_channels = planes * Self::EXPANSION;
        let downsample = (stride != 1 || in_channels != out_channels)
            .then(|| Downsample::new(in_channels, out_channels, stride, device));

        Self {
            conv1: conv([in_channels, planes], 1, 1, 0).init(device),
            bn1: BatchNormConfig::new(planes).init(device),
            relu: Relu::new(),
            conv2: conv([planes, planes], 3, stride, 1).init(device),
            bn2: BatchNormConfig::new(planes).init(device),
            conv3: conv([planes, out_channels], 1, 1, 0).init(device),
            bn3: BatchNormConfig::new(out_channels).init(device),
            downsample,
        }
    }

    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let identity = match &self.downsample {
            Some(downsample) => downsample.forward(x.clone()),
            None => x.clone(),
        };

        let out = self.relu.forward(self.bn1.forward(self.conv1.forward(x)));
        let out = self.relu.forward(self.bn2.forward(self.conv2.forward(out)));
        let out = self.bn3.forward(self.conv3.forward(out));

        self.relu.forward(out + identity)
    }

    fn shapes(&self, prefix: &str, out: &mut ParameterShapes) {
        conv_shapes(&format!("{prefix}.conv1"), &self.conv1, out);
        bn_shapes(&format!("{prefix}.bn1"), &self.bn1, out);
        conv_shapes(&format!("{prefix}.conv2"), &self.conv2, out);
        bn_shapes(&format!("{prefix}.bn2"), &self.bn2, out);
        conv_shapes(&format!("{prefix}.conv3"), &self.conv3, out);
        bn_shapes(&format!("{prefix}.bn3"), &self.bn3, out);
        if let Some(downsample) = &self.downsample {
            downsample.shapes(&format!("{prefix}.downsample"), out);
        }
    }
}

/// Either residual block flavour
#[derive(Module, Debug)]
pub enum ResidualBlock<B: Backend> {
    Basic(BasicBlock<B>),
    Bottleneck(Bottleneck<B>),
}

impl<B: Backend> ResidualBlock<B> {
    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        match self {
            Self::Basic(block) => block.forward(x),
            Self::Bottleneck(block) => block.forward(x),
        }
    }

    fn shapes(&self, prefix: &str, out: &mut ParameterShapes) {
        match self {
            Self::Basic(block) => block.shapes(prefix, out),
            Self::Bottleneck(block) => block.shapes(prefix, out),
        }
    }
}

/// One stage of residual blocks; only the first block may stride
#[derive(Module, Debug)]
pub struct LayerBlock<B: Backend> {
    pub blocks: Vec<ResidualBlock<B>>,
}

impl<B: Backend> LayerBlock<B> {
    /// Build a stage, returning it with its output channel count
    pub fn new(
        arch: Arch,
        num_blocks: usize,
        in_channels: usize,
        planes: usize,
        stride: usize,
        device: &B::Device,
    ) -> (Self, usize) {
        let out_channels = planes * arch.expansion();
        let blocks = (0..num_blocks)
            .map(|i| {
                let (block_in, block_stride) = if i == 0 {
                    (in_channels, stride)
                } else {
                    (out_channels, 1)
                };
                if arch.is_bottleneck() {
                    ResidualBlock::Bottleneck(Bottleneck::new(block_in, planes, block_stride, device))
                } else {
                    ResidualBlock::Basic(BasicBlock::new(block_in, planes, block_stride, device))
                }
            })
            .collect();

        (Self { blocks }, out_channels)
    }

    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        self.blocks.iter().fold(x, |x, block| block.forward(x))
    }

    fn shapes(&self, prefix: &str, out: &mut ParameterShapes) {
        for (i, block) in self.blocks.iter().enumerate() {
            block.shapes(&format!("{prefix}.{i}"), out);
        }
    }
}

/// ResNet classifier
///
/// Architecture:
/// - 7x7/2 stem convolution, BatchNorm, ReLU, 3x3/2 max pool
/// - Four residual stages (64, 128, 256, 512 planes)
/// - Global average pooling
/// - Linear head producing one logit per class
#[derive(Module, Debug)]
pub struct ResNet<B: Backend> {
    pub conv1: Conv2d<B>,
    pub bn1: BatchNorm<B>,
    pub relu: Relu,
    pub maxpool: MaxPool2d,
    pub layer1: LayerBlock<B>,
    pub layer2: LayerBlock<B>,
    pub layer3: LayerBlock<B>,
    pub layer4: LayerBlock<B>,
    pub avgpool: AdaptiveAvgPool2d,
    pub fc: Linear<B>,
}

impl<B: Backend> ResNet<B> {
    pub fn new(config: &ResNetConfig, device: &B::Device) -> Self {
        let arch = config.arch;
        let blocks = arch.blocks();

        let conv1 = conv([3, STEM_CHANNELS], 7, 2, 3).init(device);
        let bn1 = BatchNormConfig::new(STEM_CHANNELS).init(device);
        let maxpool = MaxPool2dConfig::new([3, 3])
            .with_strides([2, 2])
            .with_padding(PaddingConfig2d::Explicit(1, 1))
            .init();

        let (layer1, channels) =
            LayerBlock::new(arch, blocks[0], STEM_CHANNELS, STAGE_PLANES[0], 1, device);
        let (layer2, channels) =
            LayerBlock::new(arch, blocks[1], channels, STAGE_PLANES[1], 2, device);
        let (layer3, channels) =
            LayerBlock::new(arch, blocks[2], channels, STAGE_PLANES[2], 2, device);
        let (layer4, channels) =
            LayerBlock::new(arch, blocks[3], channels, STAGE_PLANES[3], 2, device);

        Self {
            conv1,
            bn1,
            relu: Relu::new(),
            maxpool,
            layer1,
            layer2,
            layer3,
            layer4,
            avgpool: AdaptiveAvgPool2dConfig::new([1, 1]).init(),
            fc: LinearConfig::new(channels, config.num_classes).init(device),
        }
    }

    /// Forward pass through the network
    ///
    /// # Arguments
    /// * `x` - Input tensor of shape [batch_size, 3, height, width]
    ///
    /// # Returns
    /// * Logits tensor of shape [batch_size, num_classes]
    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 2> {
        let x = self.conv1.forward(x);
        let x = self.relu.forward(self.bn1.forward(x));
        let x = self.maxpool.forward(x);

        let x = self.layer1.forward(x);
        let x = self.layer2.forward(x);
        let x = self.layer3.forward(x);
        let x = self.layer4.forward(x);

        // [B, C, H, W] -> [B, C]
        let x = self.avgpool.forward(x);
        let [batch_size, channels, _, _] = x.dims();
        let x = x.reshape([batch_size, channels]);

        self.fc.forward(x)
    }

    /// Replace the head with a freshly initialized `Linear(features -> num_classes)`
    pub fn with_head(mut self, num_classes: usize, device: &B::Device) -> Self {
        self.fc = LinearConfig::new(self.feature_dim(), num_classes).init(device);
        self
    }

    pub fn feature_dim(&self) -> usize {
        self.fc.weight.dims()[0]
    }

    pub fn num_classes(&self) -> usize {
        self.fc.weight.dims()[1]
    }

    /// Every parameter and running statistic with its shape
    pub fn parameter_shapes(&self) -> ParameterShapes {
        let mut out = Vec::new();
        conv_shapes("conv1", &self.conv1, &mut out);
        bn_shapes("bn1", &self.bn1, &mut out);
        self.layer1.shapes("layer1", &mut out);
        self.layer2.shapes("layer2", &mut out);
        self.layer3.shapes("layer3", &mut out);
        self.layer4.shapes("layer4", &mut out);
        out.push(("fc.weight".to_string(), self.fc.weight.dims().to_vec()));
        if let Some(bias) = &self.fc.bias {
            out.push(("fc.bias".to_string(), bias.dims().to_vec()));
        }
        out
    }
}

impl ResNetConfig {
    /// Build a randomly initialized model
    pub fn init<B: Backend>(&self, device: &B::Device) -> ResNet<B> {
        ResNet::new(self, device)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::InferenceBackend;
    use burn::tensor::Distribution;

    type TestBackend = InferenceBackend;

    #[test]
    fn test_resnet18_output_shape() {
        let device = Default::default();
        let model: ResNet<TestBackend> = ResNetConfig::new(Arch::ResNet18, 3).init(&device);

        let input = Tensor::<TestBackend, 4>::random([2, 3, 32, 32], Distribution::Default, &device);
        let output = model.forward(input);

        assert_eq!(output.dims(), [2, 3]);
        assert_eq!(model.num_classes(), 3);
        assert_eq!(model.feature_dim(), 512);
    }

    #[test]
    fn test_resnet50_uses_bottleneck_features() {
        let device = Default::default();
        let model: ResNet<TestBackend> = ResNetConfig::new(Arch::ResNet50, 7).init(&device);

        assert_eq!(model.feature_dim(), 2048);
        assert_eq!(model.layer3.blocks.len(), 6);
        assert!(matches!(model.layer1.blocks[0], ResidualBlock::Bottleneck(_)));

        let input = Tensor::<TestBackend, 4>::zeros([1, 3, 32, 32], &device);
        assert_eq!(model.forward(input).dims(), [1, 7]);
    }

    #[test]
    fn test_with_head_replaces_classifier_only() {
        let device = Default::default();
        let model: ResNet<TestBackend> = ResNetConfig::new(Arch::ResNet18, 1000).init(&device);
        let backbone_before = model.parameter_shapes();

        let model = model.with_head(5, &device);
        let backbone_after = model.parameter_shapes();

        assert_eq!(model.num_classes(), 5);
        let (head_before, rest_before): (Vec<_>, Vec<_>) =
            backbone_before.into_iter().partition(|(name, _)| name.starts_with("fc."));
        let (head_after, rest_after): (Vec<_>, Vec<_>) =
            backbone_after.into_iter().partition(|(name, _)| name.starts_with("fc."));
        assert_eq!(rest_before, rest_after);
        assert_eq!(head_before[0].1, vec![512, 1000]);
        assert_eq!(head_after[0].1, vec![512, 5]);
    }

    #[test]
    fn test_parameter_names_follow_stage_layout() {
        let device = Default::default();
        let model: ResNet<TestBackend> = ResNetConfig::new(Arch::ResNet18, 2).init(&device);
        let names: Vec<String> = model.parameter_shapes().into_iter().map(|(n, _)| n).collect();

        assert!(names.contains(&"conv1.weight".to_string()));
        assert!(names.contains(&"layer1.0.bn1.running_var".to_string()));
        assert!(names.contains(&"layer2.0.downsample.conv.weight".to_string()));
        assert!(!names.contains(&"layer1.0.downsample.conv.weight".to_string()));
        assert_eq!(names.last().map(String::as_str), Some("fc.bias"));
    }
}
