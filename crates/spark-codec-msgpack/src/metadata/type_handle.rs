//! 延迟类型句柄与运行时类型模型。
//!
//! # 教案式说明
//! - **定位 (Why)**：规划器在构建编解码器时经常需要引用“尚未构建完成”的类型（自引用、互相递归或
//!   泛型实例化时才确定的类型）。[`TypeHandle`] 以间接引用表达这类类型，直到真正需要时才解析。
//! - **契约 (What)**：
//!   - [`TypeIdentity`] 描述类型的结构化身份（命名空间 + 名称 + 泛型实参），相等与哈希只看身份；
//!   - [`RuntimeType`] 是已可用的类型模型：身份加成员表，构造后不可变；
//!   - [`TypeHandle::resolve`] 优先返回已实现形态，其次返回构建中形态，两者都缺失时报
//!     [`CodecError::TypeNotYetBuilt`]。
//! - **执行 (How)**：句柄内部共享一个 `Arc` 槽位，两个插槽都是一次写入单元，所有克隆观察到同一绑定结果。

use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use super::method_handle::RuntimeMethod;
use crate::error::{CodecError, Result};
use crate::memo::MemoCell;

/// 类型的结构化身份。
///
/// # 契约说明（What）
/// - 相等、哈希、排序均由 `namespace`、`name` 与 `arguments` 决定；
/// - `Display` 输出简单名称，泛型类型追加 `<Arg1, Arg2>`，如 `List<Int32>`；
/// - [`TypeIdentity::full_name`] 输出带命名空间的全名，供日志使用。
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TypeIdentity {
    namespace: Arc<str>,
    name: Arc<str>,
    arguments: Vec<TypeIdentity>,
}

impl TypeIdentity {
    /// 创建非泛型身份。
    pub fn new(namespace: impl Into<Arc<str>>, name: impl Into<Arc<str>>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
            arguments: Vec::new(),
        }
    }

    /// 以给定泛型实参构造封闭泛型身份。
    pub fn with_arguments(mut self, arguments: Vec<TypeIdentity>) -> Self {
        self.arguments = arguments;
        self
    }

    /// 命名空间。
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// 简单名称。
    pub fn name(&self) -> &str {
        &self.name
    }

    /// 泛型实参，非泛型类型为空。
    pub fn arguments(&self) -> &[TypeIdentity] {
        &self.arguments
    }

    /// 是否为封闭泛型类型。
    pub fn is_generic(&self) -> bool {
        !self.arguments.is_empty()
    }

    /// 去掉泛型实参后的定义身份。
    pub fn definition(&self) -> TypeIdentity {
        Self {
            namespace: Arc::clone(&self.namespace),
            name: Arc::clone(&self.name),
            arguments: Vec::new(),
        }
    }

    /// 带命名空间的全名，如 `System.Collections.Generic.List<System.Int32>`。
    pub fn full_name(&self) -> String {
        let mut buffer = String::with_capacity(64);
        if !self.namespace.is_empty() {
            buffer.push_str(&self.namespace);
            buffer.push('.');
        }
        buffer.push_str(&self.name);
        if !self.arguments.is_empty() {
            buffer.push('<');
            for (index, argument) in self.arguments.iter().enumerate() {
                if index > 0 {
                    buffer.push_str(", ");
                }
                buffer.push_str(&argument.full_name());
            }
            buffer.push('>');
        }
        buffer
    }
}

impl fmt::Display for TypeIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)?;
        if !self.arguments.is_empty() {
            f.write_str("<")?;
            for (index, argument) in self.arguments.iter().enumerate() {
                if index > 0 {
                    f.write_str(", ")?;
                }
                write!(f, "{argument}")?;
            }
            f.write_str(">")?;
        }
        Ok(())
    }
}

/// 已可用的运行时类型模型。
///
/// `methods_named` 每调用一次，查找计数加一；测试借助 [`RuntimeType::lookup_count`] 断言句柄的记忆化行为。
pub struct RuntimeType {
    identity: TypeIdentity,
    methods: Vec<Arc<RuntimeMethod>>,
    lookups: AtomicUsize,
}

impl RuntimeType {
    /// 以身份开始构建运行时类型。
    pub fn builder(identity: TypeIdentity) -> RuntimeTypeBuilder {
        RuntimeTypeBuilder {
            identity,
            methods: Vec::new(),
        }
    }

    /// 不含成员的运行时类型，常用于标量或只作为泛型实参出现的类型。
    pub fn opaque(identity: TypeIdentity) -> Arc<Self> {
        Self::builder(identity).build()
    }

    /// 类型身份。
    pub fn identity(&self) -> &TypeIdentity {
        &self.identity
    }

    /// 全部成员方法，保持声明顺序。
    pub fn methods(&self) -> &[Arc<RuntimeMethod>] {
        &self.methods
    }

    /// 按名称查找成员方法，保持声明顺序。
    pub fn methods_named(&self, name: &str) -> Vec<Arc<RuntimeMethod>> {
        self.lookups.fetch_add(1, Ordering::Relaxed);
        self.methods
            .iter()
            .filter(|method| method.name() == name)
            .cloned()
            .collect()
    }

    /// 累计成员查找次数。
    pub fn lookup_count(&self) -> usize {
        self.lookups.load(Ordering::Relaxed)
    }
}

impl fmt::Debug for RuntimeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RuntimeType")
            .field("identity", &self.identity.full_name())
            .field("methods", &self.methods.len())
            .finish()
    }
}

/// [`RuntimeType`] 的构建器。
pub struct RuntimeTypeBuilder {
    identity: TypeIdentity,
    methods: Vec<Arc<RuntimeMethod>>,
}

impl RuntimeTypeBuilder {
    /// 追加成员方法，并把方法的声明类型设为当前类型。
    pub fn method(mut self, method: RuntimeMethod) -> Self {
        let method = method.declared_by(self.identity.clone());
        self.methods.push(Arc::new(method));
        self
    }

    /// 冻结成员列表，查找计数从零开始。
    pub fn build(self) -> Arc<RuntimeType> {
        Arc::new(RuntimeType {
            identity: self.identity,
            methods: self.methods,
            lookups: AtomicUsize::new(0),
        })
    }
}

struct TypeSlot {
    identity: TypeIdentity,
    realized: MemoCell<Arc<RuntimeType>>,
    in_progress: MemoCell<Arc<RuntimeType>>,
}

/// 延迟类型句柄。
///
/// # 教案式说明
/// - **契约 (What)**：
///   - `realize` 只能成功绑定一次；以同一个 `Arc` 重复绑定视为幂等，以不同值绑定返回
///     [`CodecError::TypeAlreadyRealized`]；
///   - `resolve` 观察到已实现形态后永远返回同一个 `Arc`；构建中形态只是过渡结果，一旦已实现形态可用即被取代；
///   - 相等与哈希基于 [`TypeIdentity`]，两个独立构造的同名句柄可以作为同一个缓存键。
/// - **执行 (How)**：克隆只增加 `Arc` 引用计数，所有克隆共享槽位。
#[derive(Clone)]
pub struct TypeHandle {
    slot: Arc<TypeSlot>,
}

impl TypeHandle {
    /// 仅持有身份的句柄。
    pub fn new(identity: TypeIdentity) -> Self {
        Self {
            slot: Arc::new(TypeSlot {
                identity,
                realized: MemoCell::new(),
                in_progress: MemoCell::new(),
            }),
        }
    }

    /// `TypeHandle::new(TypeIdentity::new(namespace, name))` 的简写。
    pub fn named(namespace: impl Into<Arc<str>>, name: impl Into<Arc<str>>) -> Self {
        Self::new(TypeIdentity::new(namespace, name))
    }

    /// 直接由已实现的运行时类型构造句柄。
    pub fn realized(runtime: Arc<RuntimeType>) -> Self {
        let handle = Self::new(runtime.identity().clone());
        // 新建的槽位为空，写入不会失败。
        let _ = handle.slot.realized.set(runtime);
        handle
    }

    /// 句柄的类型身份，相等与哈希只看它。
    pub fn identity(&self) -> &TypeIdentity {
        &self.slot.identity
    }

    /// 是否已绑定最终的运行时形态；构建中形态不算。
    pub fn is_realized(&self) -> bool {
        self.slot.realized.get().is_some()
    }

    /// 绑定已实现形态。
    pub fn realize(&self, runtime: Arc<RuntimeType>) -> Result<()> {
        match self.slot.realized.set(runtime) {
            Ok(()) => {
                tracing::trace!(type_name = %self.identity().full_name(), "type handle realized");
                Ok(())
            }
            Err(rejected) => match self.slot.realized.get() {
                Some(existing) if Arc::ptr_eq(existing, &rejected) => Ok(()),
                _ => Err(CodecError::TypeAlreadyRealized {
                    type_name: self.identity().full_name(),
                }),
            },
        }
    }

    /// 绑定构建中形态；同样只能成功一次。
    pub fn declare_in_progress(&self, runtime: Arc<RuntimeType>) -> Result<()> {
        match self.slot.in_progress.set(runtime) {
            Ok(()) => Ok(()),
            Err(rejected) => match self.slot.in_progress.get() {
                Some(existing) if Arc::ptr_eq(existing, &rejected) => Ok(()),
                _ => Err(CodecError::TypeAlreadyRealized {
                    type_name: self.identity().full_name(),
                }),
            },
        }
    }

    /// 严格解析。
    pub fn resolve(&self) -> Result<Arc<RuntimeType>> {
        self.try_resolve()
            .ok_or_else(|| CodecError::TypeNotYetBuilt {
                type_name: self.identity().full_name(),
                detail: "neither a realized nor an in-progress runtime type is bound".to_owned(),
            })
    }

    /// 宽松解析：未绑定时返回 `None`。
    pub fn try_resolve(&self) -> Option<Arc<RuntimeType>> {
        self.slot
            .realized
            .get()
            .or_else(|| self.slot.in_progress.get())
            .cloned()
    }
}

impl PartialEq for TypeHandle {
    fn eq(&self, other: &Self) -> bool {
        self.identity() == other.identity()
    }
}

impl Eq for TypeHandle {}

impl Hash for TypeHandle {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.identity().hash(state);
    }
}

impl fmt::Debug for TypeHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypeHandle")
            .field("identity", &self.identity().full_name())
            .field("realized", &self.is_realized())
            .finish()
    }
}

impl fmt::Display for TypeHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self.identity(), f)
    }
}
