//! # error 模块说明
//!
//! ## 角色定位（Why）
//! - 集中定义编解码器构建管线对外暴露的错误语义：句柄解析、回调装配、线缆数据三类故障共用一个枚举；
//! - 每个变体都携带类型名或成员名，便于排查“类型尚未构建完成”这类与构建顺序相关的问题。
//!
//! ## 设计要求（What）
//! - 所有错误类型派生 `thiserror::Error`，兼容 `std::error::Error`；
//! - [`CodecError::code`] 返回稳定错误码，命名遵循 `<领域>.<语义>`，与 [`codes`] 常量一一对应；
//! - 仅 [`CodecError::TypeNotYetBuilt`] 属于可容忍错误，见 [`CodecError::is_tolerable`]。

use thiserror::Error;

/// 编解码管线的稳定错误码集合。
///
/// # 契约说明（What）
/// - 错误码由 [`CodecError::code`] 返回，可直接写入日志或指标标签；
/// - 新增变体时必须同步新增常量，已有码值不得修改。
pub mod codes {
    /// 延迟类型尚未构建完成。
    pub const TYPE_NOT_BUILT: &str = "codec.type_not_built";
    /// 成员查找命中 0 个或多个候选。
    pub const MEMBER_LOOKUP: &str = "codec.member_lookup";
    /// 泛型实参数量与定义不一致。
    pub const GENERIC_ARITY: &str = "codec.generic_arity";
    /// 集合编解码器缺失必需回调。
    pub const MISSING_CALLBACK: &str = "codec.missing_callback";
    /// 线缆数据结构非法或提前结束。
    pub const MALFORMED_INPUT: &str = "codec.malformed_input";
    /// 延迟类型已绑定到另一个运行时类型。
    pub const TYPE_REALIZED: &str = "codec.type_realized";
    /// 目标类型未注册规划器。
    pub const PLANNER_MISSING: &str = "codec.planner_missing";
    /// 缓存条目与请求的 Rust 类型不一致。
    pub const TYPE_MISMATCH: &str = "codec.type_mismatch";
    /// 方法体无法还原为期望的可调用签名。
    pub const BODY_SIGNATURE: &str = "codec.body_signature";
    /// 多态 Schema 中不存在对应子类型。
    pub const UNKNOWN_SUBTYPE: &str = "codec.unknown_subtype";
    /// 占位编解码器在构建完成前被调用。
    pub const NOT_READY: &str = "codec.not_ready";
    /// 集合长度超过配置上限。
    pub const LIMIT_EXCEEDED: &str = "codec.limit_exceeded";
}

/// 编解码器构建与执行期间的错误域。
///
/// # 教案式说明
/// - **契约 (What)**：
///   - 解析类错误（`TypeNotYetBuilt`、`AmbiguousOrMissingMember`、`GenericArityMismatch`）只在被解析的句柄上产生，
///     直接返回给调用方，不做自动重试；
///   - `MissingRequiredCallback` 在编解码器构造阶段返回，不会在解码中途出现；
///   - `MalformedWireInput` 携带出错时的字节偏移。
/// - **执行逻辑 (How)**：`Display` 文本由 `thiserror` 派生，均包含出错的类型或成员名称。
#[derive(Clone, Debug, Eq, PartialEq, Error)]
pub enum CodecError {
    /// 延迟类型既没有已实现形态，也没有构建中形态。
    #[error("type `{type_name}` is not built yet: {detail}")]
    TypeNotYetBuilt { type_name: String, detail: String },

    /// 在声明类型上按名称查找成员时，命中数量不是恰好一个。
    #[error(
        "failed to get runtime method `{type_name}.{member}`: expected exactly one candidate, found {candidates}"
    )]
    AmbiguousOrMissingMember {
        type_name: String,
        member: String,
        candidates: usize,
    },

    /// 泛型实参数量与泛型定义的形参数量不一致。
    #[error(
        "generic arity mismatch for `{method}`: definition expects {expected} argument(s), {actual} supplied"
    )]
    GenericArityMismatch {
        method: String,
        expected: usize,
        actual: usize,
    },

    /// 集合编解码器缺少必需的回调。
    #[error("collection codec for `{container}` is missing required callback `{callback}`")]
    MissingRequiredCallback {
        container: String,
        callback: &'static str,
    },

    /// 读取器报告结构非法的头部或提前结束。
    #[error("malformed wire input at offset {offset}: {detail}")]
    MalformedWireInput { offset: usize, detail: String },

    /// 延迟类型已经绑定到不同的运行时类型。
    #[error("type `{type_name}` has already been realized with a different runtime type")]
    TypeAlreadyRealized { type_name: String },

    /// 缓存未命中且目标类型没有注册规划器。
    #[error("no planner registered for type `{type_name}`")]
    PlannerNotRegistered { type_name: String },

    /// 同一缓存键被以不同的 Rust 类型请求。
    #[error("codec for `{type_name}` was requested as `{requested}` but is registered for another Rust type")]
    CodecTypeMismatch {
        type_name: String,
        requested: &'static str,
    },

    /// 方法体无法下转型为期望的可调用类型。
    #[error("body of method `{method}` is not callable as `{expected}`")]
    BodySignatureMismatch {
        method: String,
        expected: &'static str,
    },

    /// 多态 Schema 中找不到标签或运行时子类型。
    #[error("unknown subtype `{subtype}` for `{type_name}` under the active polymorphism schema")]
    UnknownSubtype { type_name: String, subtype: String },

    /// 占位编解码器在其构建完成前被调用。
    #[error("codec for `{type_name}` is still being built")]
    CodecNotReady { type_name: String },

    /// 集合元素数量超过配置上限。
    #[error("collection `{type_name}` exceeds the configured length limit: {actual} > {limit}")]
    LimitExceeded {
        type_name: String,
        limit: usize,
        actual: usize,
    },
}

impl CodecError {
    /// 返回稳定错误码。
    pub fn code(&self) -> &'static str {
        match self {
            CodecError::TypeNotYetBuilt { .. } => codes::TYPE_NOT_BUILT,
            CodecError::AmbiguousOrMissingMember { .. } => codes::MEMBER_LOOKUP,
            CodecError::GenericArityMismatch { .. } => codes::GENERIC_ARITY,
            CodecError::MissingRequiredCallback { .. } => codes::MISSING_CALLBACK,
            CodecError::MalformedWireInput { .. } => codes::MALFORMED_INPUT,
            CodecError::TypeAlreadyRealized { .. } => codes::TYPE_REALIZED,
            CodecError::PlannerNotRegistered { .. } => codes::PLANNER_MISSING,
            CodecError::CodecTypeMismatch { .. } => codes::TYPE_MISMATCH,
            CodecError::BodySignatureMismatch { .. } => codes::BODY_SIGNATURE,
            CodecError::UnknownSubtype { .. } => codes::UNKNOWN_SUBTYPE,
            CodecError::CodecNotReady { .. } => codes::NOT_READY,
            CodecError::LimitExceeded { .. } => codes::LIMIT_EXCEEDED,
        }
    }

    /// 是否可以被宽松解析入口转换为“无结果”。
    ///
    /// 只有 `TypeNotYetBuilt` 返回 `true`；成员歧义与泛型参数不匹配即使在宽松路径上也必须传播。
    pub fn is_tolerable(&self) -> bool {
        matches!(self, CodecError::TypeNotYetBuilt { .. })
    }

    /// 构造线缆数据错误。
    pub fn malformed(offset: usize, detail: impl Into<String>) -> Self {
        CodecError::MalformedWireInput {
            offset,
            detail: detail.into(),
        }
    }

    /// 为线缆数据错误附加正在解码的类型名，其余变体原样返回。
    ///
    /// 嵌套集合逐层附加，最终文本形如 `List<List<Int64>>: List<Int64>: ...`。
    pub fn within(self, type_name: &impl core::fmt::Display) -> Self {
        match self {
            CodecError::MalformedWireInput { offset, detail } => CodecError::MalformedWireInput {
                offset,
                detail: format!("{type_name}: {detail}"),
            },
            other => other,
        }
    }
}

/// crate 内统一的结果别名。
pub type Result<T, E = CodecError> = core::result::Result<T, E>;
