// Copyright (c) 2025 Graphcore Ltd. All rights reserved.

//! Derive macros for components that hold an `entity: Rc<Entity>` field.
//!
//! ```rust,ignore
//! #[derive(EntityDisplay, EntityGet, Runnable)]
//! pub struct Switch {
//!     pub entity: Rc<Entity>,
//! }
//! ```

extern crate proc_macro;

use proc_macro::TokenStream;
use proc_macro2::TokenStream as Tokens;
use quote::quote;
use syn::{DeriveInput, parse_macro_input};

/// Wrap `body` in an impl of `trait_path` for the annotated type, carrying
/// over its generics.
fn impl_for(input: &DeriveInput, trait_path: Tokens, body: Tokens) -> TokenStream {
    let name = &input.ident;
    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();
    quote! {
        impl #impl_generics #trait_path for #name #ty_generics #where_clause {
            #body
        }
    }
    .into()
}

/// Display the component as its entity's full name.
#[proc_macro_derive(EntityDisplay)]
pub fn entity_display(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    impl_for(
        &input,
        quote!(std::fmt::Display),
        quote! {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                std::fmt::Display::fmt(&self.entity, f)
            }
        },
    )
}

/// Implement `lanes_track::entity::GetEntity`.
#[proc_macro_derive(EntityGet)]
pub fn entity_get(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    impl_for(
        &input,
        quote!(lanes_track::entity::GetEntity),
        quote! {
            fn entity(&self) -> &std::rc::Rc<lanes_track::entity::Entity> {
                &self.entity
            }
        },
    )
}

/// For containers whose children do all the work: `run` returns at once.
#[proc_macro_derive(Runnable)]
pub fn runnable(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    let runnable = impl_for(&input, quote!(lanes_engine::traits::Runnable), Tokens::new());
    let runnable = Tokens::from(runnable);
    quote! {
        #[async_trait::async_trait(?Send)]
        #runnable
    }
    .into()
}
