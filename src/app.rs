//! Firebase App
//!
//! # C++ Reference
//! - `app/src/app.cc` - App implementation
//! - `app/src/include/firebase/app.h` - App class
//! - `app/src/cleanup_notifier.cc` - per-owner notifier lookup
//!
//! An [`App`] is the root owner: services hang their promises and dependent
//! objects off its [`CleanupRegistry`], and deleting the app tears all of
//! them down. Apps live in an [`AppContext`] instead of a process-wide map.

use crate::cleanup::{CleanupRegistry, ObjectId, OwnerRegistry};
use crate::error::FirebaseError;
use crate::future::FutureManager;
use crate::promise::PromiseOwner;
use crate::sync::lock;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, Weak};

/// Name used when [`AppOptions::app_name`] is `None`
pub const DEFAULT_APP_NAME: &str = "[DEFAULT]";

/// Firebase App configuration options
///
/// # C++ Reference
/// - `app/src/include/firebase/app.h` - AppOptions
#[derive(Clone, Debug)]
pub struct AppOptions {
    /// Firebase API key
    pub api_key: String,
    /// Google Cloud project ID
    pub project_id: String,
    /// App name (optional, defaults to "[DEFAULT]")
    pub app_name: Option<String>,
}

impl AppOptions {
    fn validate(&self) -> Result<(), FirebaseError> {
        if self.api_key.is_empty() {
            return Err(FirebaseError::ApiKeyNotConfigured);
        }
        if self.project_id.is_empty() {
            return Err(FirebaseError::InvalidOptions(
                "Project ID cannot be empty".to_string(),
            ));
        }
        if self.app_name.as_deref() == Some("") {
            return Err(FirebaseError::InvalidOptions(
                "App name cannot be empty".to_string(),
            ));
        }
        Ok(())
    }

    fn name(&self) -> &str {
        self.app_name.as_deref().unwrap_or(DEFAULT_APP_NAME)
    }
}

/// Container for the apps of one process or test
///
/// Holds apps by name, the owner → cleanup registry lookup, and the future
/// manager that owners allocate their tables from. Cloning yields another
/// handle to the same context.
#[derive(Clone, Default)]
pub struct AppContext {
    inner: Arc<ContextInner>,
}

#[derive(Default)]
struct ContextInner {
    apps: Mutex<HashMap<String, App>>,
    owners: OwnerRegistry,
    futures: FutureManager,
}

impl AppContext {
    /// Create an empty context
    pub fn new() -> Self {
        Self::default()
    }

    /// Cleanup registry of a live owner, if any
    ///
    /// # C++ Reference
    /// - `app/src/cleanup_notifier.cc` - CleanupNotifier::FindByOwner()
    pub fn cleanup_for(&self, owner: ObjectId) -> Option<CleanupRegistry> {
        self.inner.owners.find(owner)
    }

    /// Owner lookup shared by every app in this context
    pub fn owners(&self) -> &OwnerRegistry {
        &self.inner.owners
    }

    /// Future manager shared by every app in this context
    pub fn future_manager(&self) -> &FutureManager {
        &self.inner.futures
    }

    /// Number of live apps
    pub fn len(&self) -> usize {
        lock(&self.inner.apps).len()
    }

    /// True if no app has been created
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl fmt::Debug for AppContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<String> = lock(&self.inner.apps).keys().cloned().collect();
        names.sort();
        f.debug_struct("AppContext").field("apps", &names).finish()
    }
}

/// Firebase App instance
///
/// # C++ Reference
/// - `app/src/include/firebase/app.h`
///
/// Each app name has at most one App instance per [`AppContext`].
#[derive(Clone)]
pub struct App {
    inner: Arc<AppInner>,
}

struct AppInner {
    id: ObjectId,
    name: String,
    options: AppOptions,
    cleanup: CleanupRegistry,
    futures: FutureManager,
    context: Weak<ContextInner>,
}

impl App {
    /// Create a new Firebase App with the given options
    ///
    /// # C++ Reference
    /// - `app/src/app.cc` - App::Create()
    ///
    /// If an app with the same name already exists in `context`, returns the
    /// existing instance.
    ///
    /// # Example
    /// ```
    /// use firebase_sdk_core::{App, AppContext, AppOptions};
    ///
    /// let context = AppContext::new();
    /// let options = AppOptions {
    ///     api_key: "YOUR_API_KEY".to_string(),
    ///     project_id: "your-project-id".to_string(),
    ///     app_name: None,
    /// };
    /// let app = App::create(&context, options)?;
    /// assert_eq!(app.name(), "[DEFAULT]");
    /// # Ok::<(), firebase_sdk_core::FirebaseError>(())
    /// ```
    pub fn create(context: &AppContext, options: AppOptions) -> Result<Self, FirebaseError> {
        options.validate()?;
        let name = options.name().to_string();

        let mut apps = lock(&context.inner.apps);
        if let Some(app) = apps.get(&name) {
            return Ok(app.clone());
        }

        let id = ObjectId::next();
        let app = App {
            inner: Arc::new(AppInner {
                id,
                name: name.clone(),
                options,
                cleanup: context.inner.owners.find_or_create(id),
                futures: context.inner.futures.clone(),
                context: Arc::downgrade(&context.inner),
            }),
        };
        apps.insert(name, app.clone());
        tracing::debug!(app = %app.inner.name, id = %id, "app created");

        Ok(app)
    }

    /// Get the default Firebase App instance
    ///
    /// # C++ Reference
    /// - `app/src/app.cc` - App::GetInstance()
    pub fn get_instance(context: &AppContext) -> Result<Self, FirebaseError> {
        Self::get_instance_with_name(context, DEFAULT_APP_NAME)
    }

    /// Get a named Firebase App instance
    ///
    /// # C++ Reference
    /// - `app/src/app.cc` - App::GetInstance(name)
    pub fn get_instance_with_name(context: &AppContext, name: &str) -> Result<Self, FirebaseError> {
        lock(&context.inner.apps)
            .get(name)
            .cloned()
            .ok_or_else(|| FirebaseError::AppNotFound(name.to_string()))
    }

    /// Get the app name
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Get the app options
    pub fn options(&self) -> &AppOptions {
        &self.inner.options
    }

    /// Owner identity of this app
    pub fn id(&self) -> ObjectId {
        self.inner.id
    }

    /// True if both handles refer to the same app
    pub fn ptr_eq(&self, other: &App) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Remove the app from its context and tear down everything it owns
    ///
    /// # C++ Reference
    /// - `app/src/app.cc` - App::~App()
    ///
    /// Every registered promise is unbound, every pending future of the
    /// app's promise factories is invalidated, and every dependent object is
    /// cleared before this returns, even if other `App` handles remain.
    pub fn delete(self) {
        if let Some(context) = self.inner.context.upgrade() {
            let removed = {
                let mut apps = lock(&context.apps);
                match apps.get(&self.inner.name) {
                    Some(app) if app.ptr_eq(&self) => apps.remove(&self.inner.name),
                    _ => None,
                }
            };
            drop(removed);
        }

        let invoked = self.inner.cleanup.cleanup_all();
        tracing::debug!(app = %self.inner.name, invoked, "app deleted");
    }
}

impl PromiseOwner for App {
    fn cleanup(&self) -> &CleanupRegistry {
        &self.inner.cleanup
    }

    fn future_manager(&self) -> &FutureManager {
        &self.inner.futures
    }
}

impl Drop for AppInner {
    fn drop(&mut self) {
        self.cleanup.cleanup_all();
    }
}

impl fmt::Debug for App {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("App")
            .field("name", &self.inner.name)
            .field("id", &self.inner.id)
            .field("project_id", &self.inner.options.project_id)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dependent::Dependent;
    use crate::future::FutureStatus;
    use crate::promise::{ApiId, PromiseFactory};

    fn options(name: Option<&str>) -> AppOptions {
        AppOptions {
            api_key: "test-api-key".to_string(),
            project_id: "test-project".to_string(),
            app_name: name.map(str::to_string),
        }
    }

    #[derive(Debug, Clone, Copy)]
    enum AppFn {
        Fetch,
    }

    impl ApiId for AppFn {
        const COUNT: usize = 1;

        fn index(self) -> usize {
            self as usize
        }
    }

    #[test]
    fn test_create_app() {
        let context = AppContext::new();
        let app = App::create(&context, options(Some("test-app"))).expect("Failed to create app");
        assert_eq!(app.name(), "test-app");
        assert_eq!(app.options().project_id, "test-project");
        assert_eq!(context.len(), 1);
    }

    #[test]
    fn test_create_app_singleton() {
        let context = AppContext::new();
        let app1 = App::create(&context, options(Some("test-app-2"))).expect("Failed to create app");
        let app2 = App::create(&context, options(Some("test-app-2"))).expect("Failed to create app");

        assert!(app1.ptr_eq(&app2));
        assert_eq!(app1.id(), app2.id());
    }

    #[test]
    fn test_contexts_are_independent() {
        let first = AppContext::new();
        let second = AppContext::new();
        let a = App::create(&first, options(None)).expect("Failed to create app");
        let b = App::create(&second, options(None)).expect("Failed to create app");
        assert!(!a.ptr_eq(&b));
    }

    #[test]
    fn test_empty_api_key_error() {
        let context = AppContext::new();
        let mut opts = options(None);
        opts.api_key.clear();

        let result = App::create(&context, opts);
        assert!(matches!(result, Err(FirebaseError::ApiKeyNotConfigured)));
        assert!(context.is_empty());
    }

    #[test]
    fn test_invalid_options_error() {
        let context = AppContext::new();
        let mut opts = options(None);
        opts.project_id.clear();
        assert!(matches!(
            App::create(&context, opts),
            Err(FirebaseError::InvalidOptions(_))
        ));
        assert!(matches!(
            App::create(&context, options(Some(""))),
            Err(FirebaseError::InvalidOptions(_))
        ));
    }

    #[test]
    fn test_default_app_name() {
        let context = AppContext::new();
        let app = App::create(&context, options(None)).expect("Failed to create app");
        assert_eq!(app.name(), "[DEFAULT]");

        let found = App::get_instance(&context).expect("default app");
        assert!(found.ptr_eq(&app));
    }

    #[test]
    fn test_get_missing_instance() {
        let context = AppContext::new();
        let err = App::get_instance_with_name(&context, "nope").unwrap_err();
        assert!(matches!(err, FirebaseError::AppNotFound(ref name) if name == "nope"));
    }

    #[test]
    fn test_cleanup_lookup() {
        let context = AppContext::new();
        let app = App::create(&context, options(None)).expect("Failed to create app");
        let registry = context.cleanup_for(app.id()).expect("registry");
        assert!(registry.ptr_eq(app.cleanup()));

        drop(registry);
        drop(context);
        // The app outlives its context and keeps its registry
        assert!(!app.cleanup().is_cleaned_up());
    }

    #[test]
    fn test_delete_tears_down_owned_objects() {
        let context = AppContext::new();
        let app = App::create(&context, options(None)).expect("Failed to create app");
        let other_handle = app.clone();

        let factory = PromiseFactory::<AppFn>::create(&app);
        let promise = factory.create_promise::<String>(AppFn::Fetch);
        let future = promise.future();
        let reference = Dependent::new(app.cleanup(), "users/alice".to_string());

        app.delete();

        assert!(context.is_empty());
        assert!(App::get_instance(&context).is_err());
        assert!(!reference.is_valid());
        assert!(!promise.is_valid());
        // Pending work is invalidated even though the factory is still alive
        assert_eq!(
            future.wait(Some(std::time::Duration::from_millis(300))),
            FutureStatus::Invalid
        );
        assert!(factory.future_table().is_released());
        promise.set_value("late".to_string());
        assert_eq!(future.status(), FutureStatus::Invalid);
        assert!(other_handle.cleanup().is_cleaned_up());
        assert!(context.future_manager().is_empty());
    }

    #[test]
    fn test_recreate_after_delete() {
        let context = AppContext::new();
        let first = App::create(&context, options(None)).expect("Failed to create app");
        let first_id = first.id();
        first.delete();

        let second = App::create(&context, options(None)).expect("Failed to create app");
        assert_ne!(second.id(), first_id);
        assert!(context.cleanup_for(first_id).is_none());
        assert!(!second.cleanup().is_cleaned_up());
    }

    #[test]
    fn test_dropping_context_tears_down_apps() {
        let context = AppContext::new();
        let reference = {
            let app = App::create(&context, options(None)).expect("Failed to create app");
            Dependent::new(app.cleanup(), 7_u32)
        };
        assert!(reference.is_valid());

        drop(context);
        assert!(!reference.is_valid());
    }
}
