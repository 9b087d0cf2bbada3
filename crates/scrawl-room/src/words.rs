//! Built-in secret words.

pub const DEFAULT_WORDS: &[&str] = &[
    "apple", "airplane", "anchor", "banana", "bicycle", "bridge", "butterfly",
    "camera", "candle", "castle", "cactus", "dinosaur", "dolphin", "dragon",
    "elephant", "envelope", "feather", "fire truck", "giraffe", "guitar",
    "hammer", "helicopter", "ice cream", "island", "kangaroo", "ladder",
    "lighthouse", "mountain", "mushroom", "octopus", "penguin", "pizza",
    "rainbow", "robot", "rocket", "sandwich", "scissors", "snowman",
    "spider", "sunflower", "telescope", "tornado", "umbrella", "volcano",
    "waterfall", "windmill",
];
