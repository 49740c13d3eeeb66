//! 比赛识别与切分引擎
//!
//! 处理流程：
//! 1. 区域提取 - 按帧高缩放裁剪标签与倒计时区域
//! 2. 文本解码 - 模板模糊匹配 + 数字校验，倒计时双路交叉验证
//! 3. 时间点读取 - 多帧采样投票
//! 4. 全片扫描 - 固定步长顺序采样，可选缓存回放
//! 5. 总场次校正 - 全片众数回写
//! 6. 时间窗推算 - 按比赛平均起点生成切片窗口

pub mod accuracy;
pub mod decoder;
pub mod moment;
pub mod overlay;
pub mod reconcile;
pub mod region;
pub mod scan;
pub mod similarity;
pub mod template;
pub mod timing;

pub use accuracy::{AccuracyError, AccuracyReport, TranscriptLine};
pub use decoder::{decode_countdown, parse_slot_number, Decoded, LabelDecoder};
pub use moment::{vote, MomentReader, Observation};
pub use overlay::{FrameReading, OverlayReader, ReplayError};
pub use reconcile::reconcile_totals;
pub use region::{CountdownRasters, RegionExtractor};
pub use scan::{scan_video, CancelToken, ScanResult};
pub use template::{MatchDescriptor, MatchTemplate};
pub use timing::{time_video, ClipWindow};
