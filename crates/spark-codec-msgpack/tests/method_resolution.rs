use std::sync::{Arc, Barrier};
use std::thread;

use spark_codec_msgpack::metadata::GenericsTable;
use spark_codec_msgpack::{
    CodecError, MethodBody, MethodHandle, RuntimeMethod, RuntimeType, TypeHandle, TypeIdentity,
    TypeShape, codes, well_known,
};

fn unit() -> TypeHandle {
    TypeHandle::new(well_known::unit())
}

fn scalar(identity: TypeIdentity) -> TypeHandle {
    TypeHandle::realized(RuntimeType::opaque(identity))
}

fn converter_type() -> Arc<RuntimeType> {
    let list_of_t1 = TypeShape::Constructed {
        definition: TypeIdentity::new("System.Collections.Generic", "List"),
        arguments: vec![TypeShape::GenericParameter(1)],
    };
    RuntimeType::builder(TypeIdentity::new("Demo", "Converter"))
        .method(
            RuntimeMethod::generic("Convert", 2, TypeShape::GenericParameter(1))
                .with_parameters(vec![TypeShape::GenericParameter(0), list_of_t1]),
        )
        .build()
}

fn convert_handle(declaring: &Arc<RuntimeType>, arguments: Vec<TypeHandle>) -> MethodHandle {
    MethodHandle::new(
        "Convert",
        arguments,
        Some(TypeHandle::realized(Arc::clone(declaring))),
        unit(),
        Vec::new(),
    )
}

#[test]
fn resolution_is_idempotent_and_looks_up_once() {
    let bag = RuntimeType::builder(TypeIdentity::new("Demo", "Bag"))
        .method(RuntimeMethod::new("Add", well_known::unit()))
        .build();
    let handle = MethodHandle::new(
        "Add",
        Vec::new(),
        Some(TypeHandle::realized(Arc::clone(&bag))),
        unit(),
        Vec::new(),
    );

    let first = handle.resolve().expect("唯一成员应当解析成功");
    let second = handle.resolve().expect("重复解析应命中记忆化结果");
    let tolerant = handle
        .clone()
        .try_resolve()
        .expect("宽松入口共享同一槽位")
        .expect("已解析的句柄必然有结果");

    assert!(Arc::ptr_eq(&first, &second));
    assert!(Arc::ptr_eq(&first, &tolerant));
    assert_eq!(bag.lookup_count(), 1);
}

#[test]
fn racing_resolvers_share_one_lookup() {
    let bag = RuntimeType::builder(TypeIdentity::new("Demo", "Bag"))
        .method(RuntimeMethod::new("Add", well_known::unit()))
        .build();
    let handle = MethodHandle::new(
        "Add",
        Vec::new(),
        Some(TypeHandle::realized(Arc::clone(&bag))),
        unit(),
        Vec::new(),
    );

    const THREADS: usize = 8;
    let barrier = Arc::new(Barrier::new(THREADS));
    let workers: Vec<_> = (0..THREADS)
        .map(|_| {
            let handle = handle.clone();
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                handle.resolve().expect("并发解析不应失败")
            })
        })
        .collect();

    let results: Vec<_> = workers
        .into_iter()
        .map(|worker| worker.join().expect("线程不应 panic"))
        .collect();
    assert!(results.windows(2).all(|pair| Arc::ptr_eq(&pair[0], &pair[1])));
    assert_eq!(bag.lookup_count(), 1);
}

#[test]
fn generic_definition_is_instantiated_with_substituted_shapes() {
    let converter = converter_type();
    let handle = convert_handle(
        &converter,
        vec![scalar(well_known::int32()), scalar(well_known::string())],
    );

    let resolved = handle.resolve().expect("实参数量匹配时应当实例化成功");
    assert_eq!(resolved.return_type(), &well_known::string());
    assert_eq!(
        resolved.parameter_types(),
        &[
            well_known::int32(),
            well_known::list_of(well_known::string()),
        ]
    );
    assert_eq!(
        resolved.generic_arguments(),
        &[well_known::int32(), well_known::string()]
    );

    let again = convert_handle(
        &converter,
        vec![scalar(well_known::int32()), scalar(well_known::string())],
    )
    .resolve()
    .unwrap();
    assert!(
        Arc::ptr_eq(&resolved, &again),
        "相同定义与实参应命中泛型实例化表"
    );
    assert_eq!(converter.methods()[0].instantiation_count(), 1);
}

#[test]
fn wrong_generic_arity_is_rejected() {
    let converter = converter_type();

    for arguments in [
        vec![scalar(well_known::int32())],
        vec![
            scalar(well_known::int32()),
            scalar(well_known::string()),
            scalar(well_known::boolean()),
        ],
    ] {
        let supplied = arguments.len();
        let handle = convert_handle(&converter, arguments);

        let err = handle.resolve().expect_err("实参数量不匹配必须报错");
        assert_eq!(
            err,
            CodecError::GenericArityMismatch {
                method: "Demo.Converter.Convert".into(),
                expected: 2,
                actual: supplied,
            }
        );
        let tolerant = handle.try_resolve().expect_err("宽松入口同样传播数量错误");
        assert_eq!(tolerant.code(), codes::GENERIC_ARITY);
    }
}

#[test]
fn overloaded_members_are_ambiguous() {
    let declaring = RuntimeType::builder(TypeIdentity::new("Demo", "Bag"))
        .method(RuntimeMethod::new("Add", well_known::unit()))
        .method(
            RuntimeMethod::new("Add", well_known::unit())
                .with_parameters(vec![well_known::int64().into()]),
        )
        .build();
    let handle = MethodHandle::new(
        "Add",
        Vec::new(),
        Some(TypeHandle::realized(declaring)),
        unit(),
        Vec::new(),
    );

    for err in [
        handle.resolve().unwrap_err(),
        handle.try_resolve().unwrap_err(),
    ] {
        assert_eq!(
            err,
            CodecError::AmbiguousOrMissingMember {
                type_name: "Demo.Bag".into(),
                member: "Add".into(),
                candidates: 2,
            }
        );
    }
    assert!(!handle.is_resolved());
}

#[test]
fn pending_generic_argument_is_tolerated_until_realized() {
    let converter = converter_type();
    let pending = TypeHandle::new(TypeIdentity::new("Demo", "Node"));
    let handle = convert_handle(&converter, vec![pending.clone(), scalar(well_known::string())]);

    assert!(matches!(handle.try_resolve(), Ok(None)));
    let err = handle.resolve().expect_err("严格入口必须报告未构建");
    assert_eq!(err.code(), codes::TYPE_NOT_BUILT);
    let message = err.to_string();
    assert!(message.contains("Demo.Node"), "{message}");
    assert!(message.contains("Convert"), "严格错误必须带出方法签名: {message}");
    assert!(message.contains("Demo.Converter"), "{message}");

    pending
        .declare_in_progress(RuntimeType::opaque(TypeIdentity::new("Demo", "Node")))
        .unwrap();
    let resolved = handle
        .try_resolve()
        .unwrap()
        .expect("构建中形态足以完成解析");
    assert_eq!(resolved.parameter_types()[0].to_string(), "Node");
}

#[test]
fn specialized_bodies_win_over_shared_body() {
    fn shared(value: i64) -> i64 {
        value
    }
    fn doubled(value: i64) -> i64 {
        value * 2
    }

    let arguments = vec![well_known::int64()];
    let method = Arc::new(
        RuntimeMethod::generic("Scale", 1, TypeShape::GenericParameter(0))
            .with_body(MethodBody::new(shared as fn(i64) -> i64))
            .with_specialization(arguments.clone(), MethodBody::new(doubled as fn(i64) -> i64))
            .declared_by(TypeIdentity::new("Demo", "Math")),
    );

    let specialized = method.instantiate(&arguments).unwrap();
    let scale = specialized.callable::<fn(i64) -> i64>().unwrap();
    assert_eq!(scale(21), 42);

    let fallback = method.instantiate(&[well_known::int32()]).unwrap();
    assert_eq!(fallback.callable::<fn(i64) -> i64>().unwrap()(21), 21);

    let err = fallback.callable::<fn(i32) -> i32>().unwrap_err();
    assert_eq!(err.code(), codes::BODY_SIGNATURE);
    assert!(err.to_string().contains("Demo.Math.Scale"));
}

#[test]
fn generics_table_starts_empty() {
    let table = GenericsTable::default();
    assert!(table.is_empty());
    assert_eq!(table.len(), 0);
}
