//! 类型与方法元数据：延迟句柄、运行时模型与常用类型身份。

pub mod method_handle;
pub mod type_handle;

pub use method_handle::{
    GenericsTable, MethodBody, MethodHandle, ResolvedMethod, RuntimeMethod, TypeShape,
};
pub use type_handle::{RuntimeType, RuntimeTypeBuilder, TypeHandle, TypeIdentity};

/// 内置编解码器使用的类型身份。
///
/// `CodecContext::new` 以这些身份注册标量编解码器，规划器可据此直接取用元素编解码器。
pub mod well_known {
    use super::TypeIdentity;

    const SYSTEM: &str = "System";
    const GENERIC_COLLECTIONS: &str = "System.Collections.Generic";

    pub fn boolean() -> TypeIdentity {
        TypeIdentity::new(SYSTEM, "Boolean")
    }

    pub fn int32() -> TypeIdentity {
        TypeIdentity::new(SYSTEM, "Int32")
    }

    pub fn int64() -> TypeIdentity {
        TypeIdentity::new(SYSTEM, "Int64")
    }

    pub fn uint64() -> TypeIdentity {
        TypeIdentity::new(SYSTEM, "UInt64")
    }

    pub fn string() -> TypeIdentity {
        TypeIdentity::new(SYSTEM, "String")
    }

    pub fn binary() -> TypeIdentity {
        TypeIdentity::new(SYSTEM, "Binary")
    }

    pub fn unit() -> TypeIdentity {
        TypeIdentity::new(SYSTEM, "Unit")
    }

    /// `List<element>`。
    pub fn list_of(element: TypeIdentity) -> TypeIdentity {
        TypeIdentity::new(GENERIC_COLLECTIONS, "List").with_arguments(vec![element])
    }

    /// `HashSet<element>`。
    pub fn set_of(element: TypeIdentity) -> TypeIdentity {
        TypeIdentity::new(GENERIC_COLLECTIONS, "HashSet").with_arguments(vec![element])
    }
}
