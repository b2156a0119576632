//! Per-request context: the request plus typed, request-scoped state.
//!
//! Middlewares hand data to later layers through [`Extensions`]; the content
//! middlewares keep their shared [`ContentData`] there.

use std::{
    any::{Any, TypeId},
    collections::HashMap,
};

use crate::Request;
use crate::content::ContentData;

/// Type-erased map keyed by type, one value per type.
#[derive(Default)]
pub struct Extensions {
    map: HashMap<TypeId, Box<dyn Any + Send + Sync>>,
}

impl Extensions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts `value`, returning the previous value of the same type.
    pub fn insert<T>(&mut self, value: T) -> Option<T>
    where
        T: Send + Sync + 'static,
    {
        self.map
            .insert(TypeId::of::<T>(), Box::new(value))
            .and_then(|previous| previous.downcast::<T>().ok())
            .map(|previous| *previous)
    }

    pub fn get<T>(&self) -> Option<&T>
    where
        T: Send + Sync + 'static,
    {
        self.map
            .get(&TypeId::of::<T>())
            .and_then(|value| value.downcast_ref::<T>())
    }

    pub fn get_mut<T>(&mut self) -> Option<&mut T>
    where
        T: Send + Sync + 'static,
    {
        self.map
            .get_mut(&TypeId::of::<T>())
            .and_then(|value| value.downcast_mut::<T>())
    }

    /// Returns the value of type `T`, inserting `T::default()` first if absent.
    pub fn get_or_default<T>(&mut self) -> &mut T
    where
        T: Default + Send + Sync + 'static,
    {
        self.map
            .entry(TypeId::of::<T>())
            .or_insert_with(|| Box::new(T::default()))
            .downcast_mut::<T>()
            .unwrap_or_else(|| unreachable!("extension stored under a foreign TypeId"))
    }

    pub fn remove<T>(&mut self) -> Option<T>
    where
        T: Send + Sync + 'static,
    {
        self.map
            .remove(&TypeId::of::<T>())
            .and_then(|value| value.downcast::<T>().ok())
            .map(|value| *value)
    }
}

/// Per-request context passed down the middleware chain.
pub struct Context {
    request: Request,
    extensions: Extensions,
}

impl Context {
    pub fn new(request: Request) -> Self {
        Self {
            request,
            extensions: Extensions::new(),
        }
    }

    pub fn request(&self) -> &Request {
        &self.request
    }

    pub fn extensions(&self) -> &Extensions {
        &self.extensions
    }

    pub fn extensions_mut(&mut self) -> &mut Extensions {
        &mut self.extensions
    }

    /// The shared content data, if a content middleware has run.
    pub fn content_data(&self) -> Option<&ContentData> {
        self.extensions.get::<ContentData>()
    }

    /// The shared content data, created empty on first access.
    pub fn content_data_mut(&mut self) -> &mut ContentData {
        self.extensions.get_or_default::<ContentData>()
    }
}
