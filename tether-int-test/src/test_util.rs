use std::sync::Arc;

use tether::database::Database;
use tether::errors::TetherResult;
use tether::mapper::Collection;
use tether::registry::Registry;
use tether::schema::Schema;
use tether::store::memory::MemoryStore;

#[ctor::ctor]
fn init_logging() {
    colog::init();
}

/// Shared fixture for one test: an in-memory store, a database handle on it,
/// and a fresh registry.
#[derive(Clone)]
pub struct TestContext {
    store: MemoryStore,
    db: Database,
    registry: Registry,
}

impl TestContext {
    pub fn store(&self) -> MemoryStore {
        self.store.clone()
    }

    pub fn db(&self) -> Database {
        self.db.clone()
    }

    pub fn registry(&self) -> Registry {
        self.registry.clone()
    }

    /// Declares the schema, binds it, and hands back the collection: the
    /// full startup path most tests need.
    pub fn bind_collection(&self, schema: &Arc<Schema>) -> TetherResult<Collection> {
        self.registry.declare(schema)?;
        self.db.bind(&self.registry)?;
        self.db.collection(schema)
    }
}

pub fn create_test_context() -> TetherResult<TestContext> {
    let store = MemoryStore::new();
    let db = Database::open(Arc::new(store.clone()), "testdb");
    Ok(TestContext {
        store,
        db,
        registry: Registry::new(),
    })
}

pub fn cleanup(_ctx: TestContext) -> TetherResult<()> {
    // the in-memory store drops with the context
    Ok(())
}

/// Runs a test with panic-safe setup and cleanup. Tests run on the current
/// thread; cleanup runs whether the body passes or not.
pub fn run_test<T, B, A>(before: B, test: T, after: A)
where
    T: Fn(TestContext) -> TetherResult<()> + std::panic::UnwindSafe + std::panic::RefUnwindSafe,
    B: Fn() -> TetherResult<TestContext> + std::panic::UnwindSafe + std::panic::RefUnwindSafe,
    A: Fn(TestContext) -> TetherResult<()> + std::panic::UnwindSafe + std::panic::RefUnwindSafe,
{
    let result = std::panic::catch_unwind(|| {
        let ctx = before().expect("before run failed");
        let test_result = test(ctx.clone());
        let after_result = after(ctx);
        (test_result, after_result)
    });

    match result {
        Ok((Ok(()), Ok(()))) => {}
        Ok((Err(e), _)) => panic!("Test failed: {:?}", e),
        Ok((Ok(()), Err(e))) => panic!("After run failed: {:?}", e),
        Err(panic_err) => std::panic::resume_unwind(panic_err),
    }
}
