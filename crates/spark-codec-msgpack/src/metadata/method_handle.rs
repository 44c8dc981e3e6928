//! 延迟方法句柄、运行时方法模型与泛型实例化表。
//!
//! # 教案式说明
//! - **定位 (Why)**：规划器产出的操作（例如集合的追加操作）可能挂在尚未构建完成的类型上，也可能是泛型定义，
//!   需要等到真正执行时才能确定具体形态。[`MethodHandle`] 记录“名称 + 声明类型 + 签名”，按需解析为
//!   [`ResolvedMethod`]。
//! - **执行 (How)**：
//!   1. 已有记忆化结果直接返回；
//!   2. 直接由非泛型运行时方法构造的句柄，该方法即为结果；
//!   3. 没有声明类型时，严格入口报错、宽松入口返回 `None`；
//!   4. 否则解析声明类型，并按名称查找恰好一个成员；
//!   5. 泛型定义按声明顺序代入解析后的泛型实参，经 [`GenericsTable`] 记忆化。
//! - **契约 (What)**：严格与宽松两个入口共享同一记忆化槽位；宽松入口只把 `TypeNotYetBuilt` 转换为 `None`。

use std::any::{Any, type_name};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use dashmap::DashMap;

use super::type_handle::{TypeHandle, TypeIdentity};
use crate::error::{CodecError, Result};
use crate::memo::MemoCell;

/// 方法签名中出现的类型形状。
///
/// 泛型定义的签名可以引用泛型形参，代入实参后得到具体的 [`TypeIdentity`]。
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum TypeShape {
    /// 具体类型。
    Concrete(TypeIdentity),
    /// 方法的第 N 个泛型形参。
    GenericParameter(usize),
    /// 以形状为实参构造的泛型类型，如 `List<T0>`。
    Constructed {
        definition: TypeIdentity,
        arguments: Vec<TypeShape>,
    },
}

impl TypeShape {
    /// 代入泛型实参；引用越界的形参返回 `None`。
    pub fn substitute(&self, arguments: &[TypeIdentity]) -> Option<TypeIdentity> {
        match self {
            TypeShape::Concrete(identity) => Some(identity.clone()),
            TypeShape::GenericParameter(index) => arguments.get(*index).cloned(),
            TypeShape::Constructed {
                definition,
                arguments: shapes,
            } => {
                let substituted = shapes
                    .iter()
                    .map(|shape| shape.substitute(arguments))
                    .collect::<Option<Vec<_>>>()?;
                Some(definition.clone().with_arguments(substituted))
            }
        }
    }

    /// 未代入时用于诊断显示的身份，泛型形参显示为 `T0`、`T1`……
    fn placeholder_identity(&self) -> TypeIdentity {
        match self {
            TypeShape::Concrete(identity) => identity.clone(),
            TypeShape::GenericParameter(index) => TypeIdentity::new("", format!("T{index}")),
            TypeShape::Constructed {
                definition,
                arguments,
            } => definition.clone().with_arguments(
                arguments
                    .iter()
                    .map(TypeShape::placeholder_identity)
                    .collect(),
            ),
        }
    }
}

impl From<TypeIdentity> for TypeShape {
    fn from(identity: TypeIdentity) -> Self {
        TypeShape::Concrete(identity)
    }
}

/// 类型擦除后的方法体。
///
/// 调用方约定具体的可调用类型（如 [`crate::codec::collection::AppendFn`]），
/// 通过 [`ResolvedMethod::callable`] 还原。
#[derive(Clone)]
pub struct MethodBody(Arc<dyn Any + Send + Sync>);

impl MethodBody {
    /// 以任意 `Send + Sync` 可调用值构造方法体。
    pub fn new<F>(callable: F) -> Self
    where
        F: Any + Send + Sync,
    {
        Self(Arc::new(callable))
    }

    /// 按期望类型取回方法体，类型不符时返回 `None`。
    pub fn downcast_ref<F: Any>(&self) -> Option<&F> {
        self.0.downcast_ref::<F>()
    }
}

impl fmt::Debug for MethodBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("MethodBody(..)")
    }
}

/// 泛型实例化表：以实参列表为键记忆化特化结果。
///
/// 每个泛型定义持有一张表，键等价于 `(定义, 实参列表)`。
#[derive(Default)]
pub struct GenericsTable {
    instantiations: DashMap<Vec<TypeIdentity>, Arc<ResolvedMethod>>,
}

impl GenericsTable {
    /// 已记忆化的实参组合数量。
    pub fn len(&self) -> usize {
        self.instantiations.len()
    }

    /// 尚未发生任何实例化。
    pub fn is_empty(&self) -> bool {
        self.instantiations.is_empty()
    }

    fn get(&self, arguments: &[TypeIdentity]) -> Option<Arc<ResolvedMethod>> {
        self.instantiations
            .get(arguments)
            .map(|existing| Arc::clone(existing.value()))
    }

    fn get_or_insert(
        &self,
        arguments: &[TypeIdentity],
        build: impl FnOnce() -> ResolvedMethod,
    ) -> Arc<ResolvedMethod> {
        if let Some(existing) = self.get(arguments) {
            return existing;
        }
        let entry = self
            .instantiations
            .entry(arguments.to_vec())
            .or_insert_with(|| Arc::new(build()));
        Arc::clone(entry.value())
    }
}

/// 运行时方法：名称、签名、可选方法体，以及泛型定义的特化表。
///
/// # 契约说明（What）
/// - `generic_arity > 0` 即为泛型定义，必须经 [`RuntimeMethod::instantiate`] 代入实参后才能使用；
/// - `with_specialization` 预先登记某组实参对应的方法体，实例化时优先选用；没有登记时回落到共享方法体。
pub struct RuntimeMethod {
    name: Arc<str>,
    declaring: Option<TypeIdentity>,
    generic_arity: usize,
    return_shape: TypeShape,
    parameters: Vec<TypeShape>,
    body: Option<MethodBody>,
    specializations: HashMap<Vec<TypeIdentity>, MethodBody>,
    instantiations: GenericsTable,
}

impl RuntimeMethod {
    /// 非泛型方法。
    pub fn new(name: impl Into<Arc<str>>, return_shape: impl Into<TypeShape>) -> Self {
        Self::generic(name, 0, return_shape)
    }

    /// 泛型定义，`arity` 为泛型形参数量。
    pub fn generic(
        name: impl Into<Arc<str>>,
        arity: usize,
        return_shape: impl Into<TypeShape>,
    ) -> Self {
        Self {
            name: name.into(),
            declaring: None,
            generic_arity: arity,
            return_shape: return_shape.into(),
            parameters: Vec::new(),
            body: None,
            specializations: HashMap::new(),
            instantiations: GenericsTable::default(),
        }
    }

    /// 设置参数形状，顺序即参数顺序。
    pub fn with_parameters(mut self, parameters: Vec<TypeShape>) -> Self {
        self.parameters = parameters;
        self
    }

    /// 设置共享方法体；泛型定义没有匹配的特化时使用它。
    pub fn with_body(mut self, body: MethodBody) -> Self {
        self.body = Some(body);
        self
    }

    /// 为一组泛型实参登记专用方法体。
    pub fn with_specialization(mut self, arguments: Vec<TypeIdentity>, body: MethodBody) -> Self {
        self.specializations.insert(arguments, body);
        self
    }

    /// 指定声明类型；经 [`super::RuntimeTypeBuilder::method`] 添加时自动设置。
    pub fn declared_by(mut self, declaring: TypeIdentity) -> Self {
        self.declaring = Some(declaring);
        self
    }

    /// 方法名。
    pub fn name(&self) -> &str {
        &self.name
    }

    /// 声明类型身份，独立方法为 `None`。
    pub fn declaring_type(&self) -> Option<&TypeIdentity> {
        self.declaring.as_ref()
    }

    /// 泛型形参数量，非泛型方法为 0。
    pub fn generic_arity(&self) -> usize {
        self.generic_arity
    }

    /// 是否为需要代入实参的泛型定义。
    pub fn is_generic_definition(&self) -> bool {
        self.generic_arity > 0
    }

    /// 未代入的返回类型形状。
    pub fn return_shape(&self) -> &TypeShape {
        &self.return_shape
    }

    /// 未代入的参数形状。
    pub fn parameters(&self) -> &[TypeShape] {
        &self.parameters
    }

    /// 共享方法体（若有）。
    pub fn body(&self) -> Option<&MethodBody> {
        self.body.as_ref()
    }

    /// 已记忆化的实例化数量。
    pub fn instantiation_count(&self) -> usize {
        self.instantiations.len()
    }

    fn qualified_name(&self) -> String {
        match &self.declaring {
            Some(declaring) => format!("{}.{}", declaring.full_name(), self.name),
            None => self.name.to_string(),
        }
    }

    /// 以给定实参实例化；非泛型方法必须传入空实参列表。
    ///
    /// 同一组实参重复实例化返回同一个 `Arc`。
    pub fn instantiate(self: &Arc<Self>, arguments: &[TypeIdentity]) -> Result<Arc<ResolvedMethod>> {
        if arguments.len() != self.generic_arity {
            return Err(CodecError::GenericArityMismatch {
                method: self.qualified_name(),
                expected: self.generic_arity,
                actual: arguments.len(),
            });
        }

        if let Some(existing) = self.instantiations.get(arguments) {
            return Ok(existing);
        }

        tracing::trace!(
            method = %self.qualified_name(),
            arguments = arguments.len(),
            "instantiating runtime method"
        );
        let substitute = |shape: &TypeShape| {
            shape
                .substitute(arguments)
                .ok_or_else(|| CodecError::GenericArityMismatch {
                    method: self.qualified_name(),
                    expected: self.generic_arity,
                    actual: arguments.len(),
                })
        };
        let return_type = substitute(&self.return_shape)?;
        let parameter_types = self
            .parameters
            .iter()
            .map(substitute)
            .collect::<Result<Vec<_>>>()?;

        let resolved = self.instantiations.get_or_insert(arguments, || ResolvedMethod {
            definition: Arc::clone(self),
            generic_arguments: arguments.to_vec(),
            return_type,
            parameter_types,
            body: self
                .specializations
                .get(arguments)
                .or(self.body.as_ref())
                .cloned(),
        });
        Ok(resolved)
    }
}

impl fmt::Debug for RuntimeMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RuntimeMethod")
            .field("name", &self.qualified_name())
            .field("generic_arity", &self.generic_arity)
            .field("parameters", &self.parameters.len())
            .finish()
    }
}

/// 解析完成、可直接使用的方法。
pub struct ResolvedMethod {
    definition: Arc<RuntimeMethod>,
    generic_arguments: Vec<TypeIdentity>,
    return_type: TypeIdentity,
    parameter_types: Vec<TypeIdentity>,
    body: Option<MethodBody>,
}

impl ResolvedMethod {
    /// 方法名。
    pub fn name(&self) -> &str {
        self.definition.name()
    }

    /// 被实例化的运行时方法。
    pub fn definition(&self) -> &Arc<RuntimeMethod> {
        &self.definition
    }

    /// 代入的泛型实参，非泛型方法为空。
    pub fn generic_arguments(&self) -> &[TypeIdentity] {
        &self.generic_arguments
    }

    /// 代入后的返回类型。
    pub fn return_type(&self) -> &TypeIdentity {
        &self.return_type
    }

    /// 代入后的参数类型。
    pub fn parameter_types(&self) -> &[TypeIdentity] {
        &self.parameter_types
    }

    /// 选中的方法体：特化优先，其次共享方法体。
    pub fn body(&self) -> Option<&MethodBody> {
        self.body.as_ref()
    }

    /// 把方法体还原为调用方约定的可调用类型。
    pub fn callable<F: Any>(&self) -> Result<&F> {
        self.body
            .as_ref()
            .and_then(MethodBody::downcast_ref::<F>)
            .ok_or_else(|| CodecError::BodySignatureMismatch {
                method: self.definition.qualified_name(),
                expected: type_name::<F>(),
            })
    }
}

impl fmt::Debug for ResolvedMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResolvedMethod")
            .field("name", &self.definition.qualified_name())
            .field("generic_arguments", &self.generic_arguments)
            .field("return_type", &self.return_type)
            .field("parameter_types", &self.parameter_types)
            .finish()
    }
}

struct MethodSlot {
    name: Arc<str>,
    declaring: Option<TypeHandle>,
    return_type: TypeHandle,
    parameters: Vec<TypeHandle>,
    generic_arguments: Vec<TypeHandle>,
    runtime: Option<Arc<RuntimeMethod>>,
    resolved: MemoCell<Arc<ResolvedMethod>>,
}

/// 延迟方法句柄。
///
/// # 教案式说明
/// - **契约 (What)**：
///   - `declaring` 为 `None` 表示私有/独立操作，只有直接由运行时方法构造时才能解析；
///   - [`MethodHandle::resolve`] 失败时返回带声明类型与方法名的错误；
///   - [`MethodHandle::try_resolve`] 仅把 `TypeNotYetBuilt` 转换为 `Ok(None)`，其余错误照常传播；
///   - 成功结果缓存在句柄上，克隆共享缓存，永不重新解析。
/// - **诊断 (How)**：`Display` 输出 ``ReturnType Name`N[Arg1, Arg2](Param1, Param2)``，无泛型实参时省略中间段。
#[derive(Clone)]
pub struct MethodHandle {
    slot: Arc<MethodSlot>,
}

impl MethodHandle {
    /// 由名称与签名构造，声明类型可能尚未构建完成。
    pub fn new(
        name: impl Into<Arc<str>>,
        generic_arguments: Vec<TypeHandle>,
        declaring: Option<TypeHandle>,
        return_type: TypeHandle,
        parameters: Vec<TypeHandle>,
    ) -> Self {
        Self::from_slot(MethodSlot {
            name: name.into(),
            declaring,
            return_type,
            parameters,
            generic_arguments,
            runtime: None,
            resolved: MemoCell::new(),
        })
    }

    /// 由现成的运行时方法构造，参数类型取自方法签名。
    pub fn from_runtime(method: Arc<RuntimeMethod>) -> Self {
        let parameters = method
            .parameters()
            .iter()
            .map(|shape| TypeHandle::new(shape.placeholder_identity()))
            .collect();
        Self::from_runtime_with_parameters(method, parameters)
    }

    /// 由现成的运行时方法构造，并显式给出参数类型句柄。
    pub fn from_runtime_with_parameters(
        method: Arc<RuntimeMethod>,
        parameters: Vec<TypeHandle>,
    ) -> Self {
        Self::from_slot(MethodSlot {
            name: Arc::clone(&method.name),
            declaring: method.declaring_type().cloned().map(TypeHandle::new),
            return_type: TypeHandle::new(method.return_shape().placeholder_identity()),
            parameters,
            generic_arguments: Vec::new(),
            runtime: Some(method),
            resolved: MemoCell::new(),
        })
    }

    fn from_slot(slot: MethodSlot) -> Self {
        Self {
            slot: Arc::new(slot),
        }
    }

    /// 方法名。
    pub fn name(&self) -> &str {
        &self.slot.name
    }

    /// 声明类型句柄，私有/独立操作为 `None`。
    pub fn declaring_type(&self) -> Option<&TypeHandle> {
        self.slot.declaring.as_ref()
    }

    /// 返回类型句柄。
    pub fn return_type(&self) -> &TypeHandle {
        &self.slot.return_type
    }

    /// 参数类型句柄。
    pub fn parameter_types(&self) -> &[TypeHandle] {
        &self.slot.parameters
    }

    /// 泛型实参句柄，按声明顺序。
    pub fn generic_arguments(&self) -> &[TypeHandle] {
        &self.slot.generic_arguments
    }

    /// 直接持有的运行时方法（若有）。
    pub fn runtime_method(&self) -> Option<&Arc<RuntimeMethod>> {
        self.slot.runtime.as_ref()
    }

    /// 是否已有记忆化的解析结果。
    pub fn is_resolved(&self) -> bool {
        self.slot.resolved.get().is_some()
    }

    /// 严格解析。
    pub fn resolve(&self) -> Result<Arc<ResolvedMethod>> {
        match self.resolve_core(true)? {
            Some(resolved) => Ok(resolved),
            // 严格模式下 `resolve_uncached` 不会返回 `None`。
            None => Err(self.not_built_error()),
        }
    }

    /// 宽松解析。
    pub fn try_resolve(&self) -> Result<Option<Arc<ResolvedMethod>>> {
        self.resolve_core(false)
    }

    fn resolve_core(&self, throws: bool) -> Result<Option<Arc<ResolvedMethod>>> {
        self.slot
            .resolved
            .get_or_try_init(|| self.resolve_uncached(throws))
            .map(|resolved| resolved.cloned())
    }

    fn resolve_uncached(&self, throws: bool) -> Result<Option<Arc<ResolvedMethod>>> {
        let slot = &self.slot;
        let tolerate = |err: CodecError| -> Result<Option<Arc<ResolvedMethod>>> {
            if !throws && err.is_tolerable() {
                Ok(None)
            } else {
                Err(err)
            }
        };

        if let Some(runtime) = &slot.runtime
            && !runtime.is_generic_definition()
        {
            return runtime.instantiate(&[]).map(Some);
        }

        let Some(declaring) = &slot.declaring else {
            return tolerate(self.not_built_error());
        };

        let definition = match &slot.runtime {
            Some(runtime) => Arc::clone(runtime),
            None => {
                let declaring_type = match declaring.resolve() {
                    Ok(declaring_type) => declaring_type,
                    Err(err) => return tolerate(self.pending(err, "declaring type")),
                };
                let mut found = declaring_type.methods_named(&slot.name);
                if found.len() != 1 {
                    return Err(CodecError::AmbiguousOrMissingMember {
                        type_name: declaring_type.identity().full_name(),
                        member: slot.name.to_string(),
                        candidates: found.len(),
                    });
                }
                found.remove(0)
            }
        };

        if !definition.is_generic_definition() {
            return definition.instantiate(&[]).map(Some);
        }

        let mut arguments = Vec::with_capacity(slot.generic_arguments.len());
        for argument in &slot.generic_arguments {
            match argument.resolve() {
                Ok(resolved) => arguments.push(resolved.identity().clone()),
                Err(err) => return tolerate(self.pending(err, "generic argument")),
            }
        }

        tracing::trace!(method = %self, "resolving generic method handle");
        definition.instantiate(&arguments).map(Some)
    }

    /// 依赖的类型尚未构建时，在错误中补上声明类型与本方法签名。
    fn pending(&self, err: CodecError, role: &str) -> CodecError {
        match err {
            CodecError::TypeNotYetBuilt { type_name, detail } => CodecError::TypeNotYetBuilt {
                detail: format!(
                    "method '{self}' declared on `{}` cannot be resolved while its {role} `{type_name}` is pending: {detail}",
                    self.declaring_name()
                ),
                type_name,
            },
            other => other,
        }
    }

    fn declaring_name(&self) -> String {
        self.slot
            .declaring
            .as_ref()
            .map(|declaring| declaring.identity().full_name())
            .unwrap_or_else(|| "<private>".to_owned())
    }

    fn not_built_error(&self) -> CodecError {
        CodecError::TypeNotYetBuilt {
            type_name: self.declaring_name(),
            detail: format!(
                "'{self}' is building a private method, but its runtime method is not specified"
            ),
        }
    }
}

impl fmt::Display for MethodHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.slot.return_type, self.slot.name)?;

        let generic_arguments = &self.slot.generic_arguments;
        if !generic_arguments.is_empty() {
            write!(f, "`{}[", generic_arguments.len())?;
            for (index, argument) in generic_arguments.iter().enumerate() {
                if index > 0 {
                    f.write_str(", ")?;
                }
                write!(f, "{argument}")?;
            }
            f.write_str("]")?;
        }

        f.write_str("(")?;
        for (index, parameter) in self.slot.parameters.iter().enumerate() {
            if index > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{parameter}")?;
        }
        f.write_str(")")
    }
}

impl fmt::Debug for MethodHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MethodHandle")
            .field("signature", &self.to_string())
            .field("declaring", &self.slot.declaring)
            .field("resolved", &self.is_resolved())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use tracing_test::traced_test;

    use super::*;
    use crate::error::codes;
    use crate::metadata::RuntimeType;

    fn unit() -> TypeHandle {
        TypeHandle::named("System", "Unit")
    }

    #[test]
    fn renders_plain_signature() {
        let add = MethodHandle::new(
            "Add",
            Vec::new(),
            Some(TypeHandle::named("Demo", "T")),
            unit(),
            Vec::new(),
        );
        assert_eq!(add.to_string(), "Unit Add()");
    }

    #[test]
    fn renders_generic_signature() {
        let convert = MethodHandle::new(
            "Convert",
            vec![TypeHandle::named("System", "Int32")],
            Some(TypeHandle::named("Demo", "T")),
            unit(),
            vec![TypeHandle::named("System", "String")],
        );
        assert_eq!(convert.to_string(), "Unit Convert`1[Int32](String)");
    }

    #[test]
    fn private_method_without_runtime_form_is_not_built() {
        let private = MethodHandle::new("UnpackItem", Vec::new(), None, unit(), Vec::new());

        assert!(matches!(private.try_resolve(), Ok(None)));
        let err = private.resolve().expect_err("私有方法缺少运行时形态时严格解析必须失败");
        assert_eq!(err.code(), codes::TYPE_NOT_BUILT);
        assert!(err.to_string().contains("UnpackItem"));
    }

    #[test]
    fn runtime_method_without_declaring_type_resolves_directly() {
        let method = Arc::new(RuntimeMethod::new(
            "Helper",
            TypeIdentity::new("System", "Unit"),
        ));
        let handle = MethodHandle::from_runtime(Arc::clone(&method));
        assert!(handle.declaring_type().is_none());

        let resolved = handle.resolve().expect("非泛型运行时方法应直接解析");
        assert!(Arc::ptr_eq(resolved.definition(), &method));
    }

    #[test]
    fn missing_member_is_not_tolerated() {
        let declaring = TypeHandle::realized(RuntimeType::opaque(TypeIdentity::new("Demo", "Bag")));
        let handle = MethodHandle::new("Add", Vec::new(), Some(declaring), unit(), Vec::new());

        let err = handle
            .try_resolve()
            .expect_err("成员缺失即使在宽松入口也必须传播");
        assert_eq!(
            err,
            CodecError::AmbiguousOrMissingMember {
                type_name: "Demo.Bag".into(),
                member: "Add".into(),
                candidates: 0,
            }
        );
    }

    #[test]
    fn strict_error_names_method_and_pending_declaring_type() {
        let push = MethodHandle::new(
            "Push",
            Vec::new(),
            Some(TypeHandle::named("Demo", "Bag")),
            unit(),
            Vec::new(),
        );

        let err = push.resolve().expect_err("声明类型未构建时严格解析必须失败");
        assert_eq!(err.code(), codes::TYPE_NOT_BUILT);
        let message = err.to_string();
        assert!(message.contains("Demo.Bag"), "{message}");
        assert!(message.contains("Unit Push()"), "{message}");
    }

    #[traced_test]
    #[test]
    fn repeated_instantiation_hits_table_before_substituting() {
        let identity = RuntimeMethod::generic("Identity", 1, TypeShape::GenericParameter(0))
            .with_parameters(vec![TypeShape::GenericParameter(0)])
            .declared_by(TypeIdentity::new("Demo", "Math"));
        let identity = Arc::new(identity);
        let arguments = [TypeIdentity::new("System", "Int64")];

        let first = identity.instantiate(&arguments).unwrap();
        let second = identity.instantiate(&arguments).unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(identity.instantiation_count(), 1);
        logs_assert(|lines: &[&str]| {
            match lines
                .iter()
                .filter(|line| line.contains("instantiating runtime method"))
                .count()
            {
                1 => Ok(()),
                n => Err(format!("expected one substitution, saw {n}")),
            }
        });
    }

    #[test]
    fn tolerant_result_is_retried_after_type_is_realized() {
        let declaring = TypeHandle::named("Demo", "Bag");
        let handle = MethodHandle::new(
            "Add",
            Vec::new(),
            Some(declaring.clone()),
            unit(),
            Vec::new(),
        );
        assert!(matches!(handle.try_resolve(), Ok(None)));
        assert!(!handle.is_resolved());

        declaring
            .realize(
                RuntimeType::builder(TypeIdentity::new("Demo", "Bag"))
                    .method(RuntimeMethod::new("Add", TypeIdentity::new("System", "Unit")))
                    .build(),
            )
            .unwrap();
        let resolved = handle.try_resolve().unwrap().expect("声明类型实现后应可解析");
        assert_eq!(resolved.name(), "Add");
        assert!(handle.is_resolved());
    }

    #[test]
    fn shapes_substitute_nested_parameters() {
        let shape = TypeShape::Constructed {
            definition: TypeIdentity::new("System.Collections.Generic", "List"),
            arguments: vec![TypeShape::GenericParameter(1)],
        };
        let arguments = [
            TypeIdentity::new("System", "Int32"),
            TypeIdentity::new("System", "String"),
        ];
        assert_eq!(
            shape.substitute(&arguments).map(|identity| identity.to_string()),
            Some("List<String>".to_owned())
        );
        assert_eq!(TypeShape::GenericParameter(2).substitute(&arguments), None);
    }
}
