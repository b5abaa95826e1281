use proc_macro::TokenStream;
use quote::quote;
use syn::{DeriveInput, parse_macro_input};

#[proc_macro_derive(Document, attributes(document))]
pub fn document_derive(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);

    let name = &input.ident;

    let collection_name = input
        .attrs
        .iter()
        .find(|attr| attr.path.is_ident("document"))
        .and_then(|attr| attr.parse_meta().ok())
        .and_then(|meta| {
            let syn::Meta::List(meta_list) = meta else {
                return None;
            };

            meta_list.nested.into_iter().find_map(|nested_meta| {
                let syn::NestedMeta::Meta(syn::Meta::NameValue(name_value)) =
                    nested_meta
                else {
                    return None;
                };

                if !name_value.path.is_ident("collection") {
                    return None;
                }

                let syn::Lit::Str(lit_str) = name_value.lit else {
                    return None;
                };

                Some(lit_str.value())
            })
        });

    let Some(collection_name) = collection_name else {
        return TokenStream::from(quote! {compile_error!(
                "The #[derive(Document)] macro requires a \
                #[document(collection = \"...\")] attribute."
        )});
    };

    TokenStream::from(quote! {
        impl #name {
            pub const COLLECTION: &'static str = #collection_name;

            pub fn collection(
                db: &crate::db::Db
            ) -> mongodb::Collection<#name> {
                db.database().collection::<#name>(#collection_name)
            }

            // ? untyped handle for projections that don't fit the struct
            pub fn raw_collection(
                db: &crate::db::Db
            ) -> mongodb::Collection<mongodb::bson::Document> {
                db.database()
                    .collection::<mongodb::bson::Document>(#collection_name)
            }

            pub async fn find_one(
                db: &crate::db::Db,
                query: mongodb::bson::Document
            ) -> Result<Option<#name>, mongodb::error::Error>
            where #name: serde::de::DeserializeOwned + Send + Sync {
                Self::collection(db).find_one(query).await
            }

            pub async fn count_documents(
                db: &crate::db::Db,
                query: mongodb::bson::Document
            ) -> Result<u64, mongodb::error::Error> {
                Self::collection(db).count_documents(query).await
            }
        }
    })
}
