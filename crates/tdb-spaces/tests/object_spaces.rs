use std::{sync::Arc, thread, time::Duration};

use tdb_spaces::{ExecutionContext, ObjectRef, RegisterKey, SpaceError, StackFrame};
use tdb_store::{EntryStore, SpaceEntry};
use tdb_testkit::{Fixture, STACK_KEY};

/// `Processes[1].Threads[2]` with a `Registers` container directly below it.
fn thread_object(fx: &Fixture) -> (ObjectRef, ObjectRef) {
    let objects = &fx.objects;
    let processes = objects.root("Processes");
    let process = objects.element(&processes, 1, false);
    let threads = objects.child(&process, "Threads", false);
    let thread = objects.element(&threads, 2, false);
    let registers = objects.child(&thread, "Registers", true);
    (thread, registers)
}

#[test]
fn context_resolves_to_overlay_named_after_container() {
    let fx = Fixture::object_addressed();
    let registry = fx.registry();
    let (thread, registers) = thread_object(&fx);
    let context = fx.contexts.add_with_object(2, "t2", thread);

    let space = registry
        .get_for_register_space(&context, 0, true)
        .unwrap()
        .expect("created");
    assert_eq!(space.space.name(), "Processes[1].Threads[2].Registers");
    assert!(space.space.is_overlay());
    assert!(space.space.is_register());
    assert_eq!(space.table_name(), "Memory_Processes[1].Threads[2].Registers");
    assert_eq!(space.context, None);
    assert_eq!(
        fx.table().entries().unwrap()[0].1,
        SpaceEntry::unbound(registers.path.to_string())
    );
    assert_eq!(fx.spaces.overlays_created(), 1);

    // repeat lookups are served from the object cache
    let calls = fx.spaces.calls();
    let queries = fx.objects.queries();
    let again = registry
        .get_for_register_space(&context, 0, false)
        .unwrap()
        .expect("cached");
    assert!(Arc::ptr_eq(&space, &again));
    assert_eq!(fx.spaces.calls(), calls);
    assert_eq!(fx.objects.queries(), queries);

    let direct = registry
        .get_register(
            &RegisterKey::ByObject {
                object: registers,
                frame_level: 0,
            },
            true,
        )
        .unwrap()
        .expect("same container");
    assert!(Arc::ptr_eq(&space, &direct));
    assert_eq!(fx.table().len(), 1);
}

#[test]
fn stack_frames_select_their_own_container() {
    let fx = Fixture::object_addressed();
    let registry = fx.registry();
    let objects = &fx.objects;
    let threads = objects.root("Threads");
    let thread = objects.element(&threads, 0, false);
    let stack = objects.child(&thread, STACK_KEY, false);
    let mut frames = Vec::new();
    for level in 0..3 {
        let frame = objects.element(&stack, level, false);
        objects.child(&frame, "Registers", true);
        frames.push(frame);
    }
    let context = fx.contexts.add_with_object(0, "t0", thread);

    let top = registry.get_for_register_space(&context, 0, true).unwrap().unwrap();
    let second = registry.get_for_register_space(&context, 2, true).unwrap().unwrap();
    assert_eq!(top.space.name(), "Threads[0].Stack[0].Registers");
    assert_eq!(second.space.name(), "Threads[0].Stack[2].Registers");
    assert!(!Arc::ptr_eq(&top, &second));

    // a frame object already pins its level
    let by_frame = registry
        .get_for_frame(&StackFrame::Object(frames[2].clone()), false)
        .unwrap()
        .expect("found");
    assert!(Arc::ptr_eq(&second, &by_frame));
}

#[test]
fn object_without_container_yields_nothing() {
    let fx = Fixture::object_addressed();
    let registry = fx.registry();
    let lonely = fx.objects.root("Lonely");
    let context = fx.contexts.add_with_object(5, "t5", lonely);

    assert!(registry.get_for_register_space(&context, 0, true).unwrap().is_none());
    assert!(fx.table().is_empty());
    assert_eq!(fx.spaces.overlays_created(), 0);
}

#[test]
fn read_path_does_not_mint_overlays() {
    let fx = Fixture::object_addressed();
    let registry = fx.registry();
    let (thread, _) = thread_object(&fx);
    let context = fx.contexts.add_with_object(2, "t2", thread);

    assert!(registry.get_for_register_space(&context, 0, false).unwrap().is_none());
    assert_eq!(fx.spaces.overlays_created(), 0);
    assert!(fx.table().is_empty());

    // not cached as absent either
    assert!(registry.get_for_register_space(&context, 0, true).unwrap().is_some());
}

#[test]
fn overlay_failure_is_reported() {
    let fx = Fixture::object_addressed();
    let registry = fx.registry();
    let (thread, _) = thread_object(&fx);
    let context = fx.contexts.add_with_object(2, "t2", thread);
    fx.spaces.set_fail_overlays(true);

    assert!(registry.get_for_register_space(&context, 0, true).unwrap().is_none());
    assert_eq!(fx.errors.errors().len(), 1);
    assert!(fx.table().is_empty());

    fx.spaces.set_fail_overlays(false);
    assert!(registry.get_for_register_space(&context, 0, true).unwrap().is_some());
}

#[test]
fn context_without_object_is_invalid() {
    let fx = Fixture::object_addressed();
    let registry = fx.registry();
    let context = fx.contexts.add(4, "orphan");

    let err = registry.get_for_register_space(&context, 0, true).unwrap_err();
    assert!(matches!(err, SpaceError::InvalidArgument(_)), "{err:?}");

    let stranger = ExecutionContext::new(4, "someone else");
    assert!(matches!(
        registry.get_for_register_space(&stranger, 0, true),
        Err(SpaceError::NotMine(4))
    ));
}

#[test]
fn persisted_overlay_is_found_by_a_fresh_registry() {
    let fx = Fixture::object_addressed();
    let (thread, _) = thread_object(&fx);
    let context = fx.contexts.add_with_object(2, "t2", thread);

    let first = fx.registry();
    let created = first.get_for_register_space(&context, 0, true).unwrap().unwrap();

    let second = fx.registry();
    let loaded = second
        .get_for_register_space(&context, 0, false)
        .unwrap()
        .expect("loaded from table");
    assert_eq!(loaded.slot, created.slot);
    assert_ne!(loaded.serial, created.serial);
    assert_eq!(second.active_memory_spaces().len(), 1);
    assert_eq!(fx.table().len(), 1);
}

#[test]
fn concurrent_creators_share_one_overlay_row() {
    let fx = Fixture::object_addressed();
    fx.factory.set_delay(Duration::from_millis(5));
    let registry = &fx.registry();
    let (owner, _) = thread_object(&fx);
    let context = &fx.contexts.add_with_object(2, "t2", owner);

    let spaces: Vec<_> = thread::scope(|scope| {
        let handles: Vec<_> = (0..8)
            .map(|_| {
                scope.spawn(move || {
                    registry
                        .get_for_register_space(context, 0, true)
                        .unwrap()
                        .expect("space")
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    assert!(spaces.iter().all(|space| Arc::ptr_eq(space, &spaces[0])));
    assert_eq!(fx.table().len(), 1);
    assert_eq!(fx.factory.created(), 1);
    assert_eq!(fx.spaces.overlays_created(), 1);
}

#[test]
fn overlay_rows_need_a_context_directory_on_reload() {
    let fx = Fixture::object_addressed();
    let (thread, _) = thread_object(&fx);
    let context = fx.contexts.add_with_object(2, "t2", thread);
    fx.registry()
        .get_for_register_space(&context, 0, true)
        .unwrap()
        .expect("created");

    let bare = fx.bare_builder().build(&fx.stores).unwrap();
    assert!(bare.active_spaces().is_empty());
    assert_eq!(fx.table().len(), 1);
}
