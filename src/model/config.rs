//! Model Configuration Module
//!
//! Architecture selection and the configuration used to build a classifier.

use std::fmt;
use std::str::FromStr;

use burn::config::Config;
use clap::ValueEnum;
use serde::{Deserialize, Serialize};

/// Number of classes of the ImageNet head shipped with pretrained weights
pub const IMAGENET_CLASSES: usize = 1000;

/// Supported ResNet depths
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Arch {
    #[value(name = "resnet18")]
    ResNet18,
    #[value(name = "resnet34")]
    ResNet34,
    #[default]
    #[value(name = "resnet50")]
    ResNet50,
    #[value(name = "resnet101")]
    ResNet101,
}

impl Arch {
    /// Number of residual blocks in each of the four stages
    pub fn blocks(&self) -> [usize; 4] {
        match self {
            Arch::ResNet18 => [2, 2, 2, 2],
            Arch::ResNet34 => [3, 4, 6, 3],
            Arch::ResNet50 => [3, 4, 6, 3],
            Arch::ResNet101 => [3, 4, 23, 3],
        }
    }

    /// Whether the stages use bottleneck blocks (1x1, 3x3, 1x1)
    pub fn is_bottleneck(&self) -> bool {
        matches!(self, Arch::ResNet50 | Arch::ResNet101)
    }

    /// Channel expansion of the last convolution in each block
    pub fn expansion(&self) -> usize {
        if self.is_bottleneck() {
            4
        } else {
            1
        }
    }

    /// Width of the pooled feature vector fed to the head
    pub fn feature_dim(&self) -> usize {
        512 * self.expansion()
    }

    /// Where torchvision publishes the default ImageNet weights for this depth
    pub fn torchvision_url(&self) -> &'static str {
        match self {
            Arch::ResNet18 => "https://download.pytorch.org/models/resnet18-f37072fd.pth",
            Arch::ResNet34 => "https://download.pytorch.org/models/resnet34-b627a593.pth",
            Arch::ResNet50 => "https://download.pytorch.org/models/resnet50-11ad3fa6.pth",
            Arch::ResNet101 => "https://download.pytorch.org/models/resnet101-cd907fc2.pth",
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Arch::ResNet18 => "resnet18",
            Arch::ResNet34 => "resnet34",
            Arch::ResNet50 => "resnet50",
            Arch::ResNet101 => "resnet101",
        }
    }
}

impl fmt::Display for Arch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Arch {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace('-', "").as_str() {
            "resnet18" => Ok(Arch::ResNet18),
            "resnet34" => Ok(Arch::ResNet34),
            "resnet50" => Ok(Arch::ResNet50),
            "resnet101" => Ok(Arch::ResNet101),
            other => Err(format!(
                "unknown architecture '{}', expected one of resnet18, resnet34, resnet50, resnet101",
                other
            )),
        }
    }
}

/// Configuration of a ResNet classifier
#[derive(Config, Debug)]
pub struct ResNetConfig {
    /// Backbone depth
    pub arch: Arch,
    /// Number of output classes of the head
    pub num_classes: usize,
}

impl ResNetConfig {
    /// Validate the configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.num_classes == 0 {
            return Err("num_classes must be greater than 0".to_string());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_arch_is_resnet50() {
        assert_eq!(Arch::default(), Arch::ResNet50);
        assert_eq!(Arch::default().feature_dim(), 2048);
    }

    #[test]
    fn test_arch_parsing() {
        assert_eq!("resnet50".parse::<Arch>(), Ok(Arch::ResNet50));
        assert_eq!("ResNet-18".parse::<Arch>(), Ok(Arch::ResNet18));
        assert!("vgg16".parse::<Arch>().is_err());
        assert_eq!(Arch::ResNet34.to_string(), "resnet34");
        assert_eq!(serde_json::to_string(&Arch::ResNet101).unwrap(), "\"resnet101\"");
    }

    #[test]
    fn test_feature_dims() {
        assert_eq!(Arch::ResNet18.feature_dim(), 512);
        assert_eq!(Arch::ResNet34.feature_dim(), 512);
        assert_eq!(Arch::ResNet50.feature_dim(), 2048);
        assert_eq!(Arch::ResNet101.feature_dim(), 2048);
    }

    #[test]
    fn test_config_validation() {
        assert!(ResNetConfig::new(Arch::ResNet18, 3).validate().is_ok());
        assert!(ResNetConfig::new(Arch::ResNet18, 0).validate().is_err());
    }
}
