mod decode_entity;
mod decode_field;

use decode_entity::{EntityMetadata, decode_entity};
use decode_field::{FieldMetadata, FieldRole, prototype};
use proc_macro::TokenStream;
use proc_macro2::TokenStream as TokenStream2;
use quote::quote;
use syn::{ItemStruct, parse_macro_input};

fn option_literal(value: &Option<String>) -> TokenStream2 {
    match value {
        Some(v) => quote!(Some(#v)),
        None => quote!(None),
    }
}

fn field_descriptor(field: &FieldMetadata) -> Option<TokenStream2> {
    let property = &field.property;
    let column = field.column.as_ref().map(|v| quote!(.column(#v)));
    let alias = option_literal(&field.alias);
    let descriptor = match field.role {
        FieldRole::Skipped => return None,
        FieldRole::Attribute => {
            let value = prototype(field);
            quote!(::strata::FieldDescriptor::new(#property, #value) #column)
        }
        FieldRole::PrimaryKey => {
            let value = prototype(field);
            quote!(::strata::FieldDescriptor::new(#property, #value) #column .primary_key())
        }
        FieldRole::AutoNumber => {
            let value = prototype(field);
            quote!(::strata::FieldDescriptor::new(#property, #value) #column .auto_number())
        }
        FieldRole::Ignored => {
            quote!(::strata::FieldDescriptor::new(#property, ::strata::Value::Null) #column .ignored())
        }
        FieldRole::Related => {
            let value = prototype(field);
            let entity = &field.entity;
            let use_attribute_alias = field.use_attribute_alias;
            quote! {
                ::strata::FieldDescriptor::new(#property, #value) #column
                    .related(<#entity as ::strata::Entity>::descriptor, #alias, #use_attribute_alias)
            }
        }
        FieldRole::Relation => {
            let (ty, _) = field.relation_type();
            quote! {
                ::strata::FieldDescriptor::new(#property, ::strata::Value::Null)
                    .relation(<#ty as ::strata::Entity>::descriptor, #alias)
            }
        }
    };
    Some(descriptor)
}

fn write_field(field: &FieldMetadata) -> TokenStream2 {
    let ident = &field.ident;
    match field.role {
        FieldRole::Skipped => quote!(),
        FieldRole::Ignored => quote!(out.push(::strata::Value::Null);),
        FieldRole::Relation => {
            let (ty, optional) = field.relation_type();
            if optional {
                quote! {
                    out.push(::strata::Value::Null);
                    ::strata::write_optional_relation::<#ty>(&self.#ident, out);
                }
            } else {
                quote! {
                    out.push(::strata::Value::Null);
                    ::strata::Entity::write_values(&self.#ident, out);
                }
            }
        }
        _ => quote! {
            out.push(::strata::AsValue::as_value(::std::clone::Clone::clone(&self.#ident)));
        },
    }
}

fn read_field(field: &FieldMetadata) -> TokenStream2 {
    let ident = &field.ident;
    let property = &field.property;
    let ty = &field.ty;
    let value = match field.role {
        FieldRole::Skipped => quote!(::std::default::Default::default()),
        FieldRole::Ignored => quote! {{
            ::strata::skip_value(values, #property)?;
            ::std::default::Default::default()
        }},
        FieldRole::Relation => {
            let (inner, optional) = field.relation_type();
            if optional {
                quote! {{
                    ::strata::skip_value(values, #property)?;
                    ::strata::read_optional_relation::<#inner>(values, #property)?
                }}
            } else {
                quote! {{
                    ::strata::skip_value(values, #property)?;
                    ::strata::read_relation::<#inner>(values, #property)?
                }}
            }
        }
        _ => quote!(::strata::read_value::<#ty>(values, #property)?),
    };
    quote!(#ident: #value)
}

fn entity_impl(entity: &EntityMetadata) -> TokenStream2 {
    let name = &entity.item.ident;
    let entity_name = &entity.entity_name;
    let schema = &entity.schema;
    let table = &entity.name;
    let alternate_key = &entity.alternate_key;
    let fields = entity.fields.iter().filter_map(field_descriptor);
    let writes = entity.fields.iter().map(write_field);
    let reads = entity.fields.iter().map(read_field);
    let references = entity
        .fields
        .iter()
        .filter(|v| v.role != FieldRole::Skipped)
        .map(|field| {
            let ident = &field.ident;
            let property = &field.property;
            quote! {
                #[allow(non_upper_case_globals)]
                pub const #ident: ::strata::AttributeRef =
                    ::strata::AttributeRef::new(<#name as ::strata::Entity>::descriptor, #property);
            }
        });
    quote! {
        impl ::strata::Entity for #name {
            fn descriptor() -> &'static ::strata::EntityDescriptor {
                static DESCRIPTOR: ::std::sync::LazyLock<::strata::EntityDescriptor> =
                    ::std::sync::LazyLock::new(|| {
                        ::strata::EntityDescriptor::new(
                            concat!(module_path!(), "::", stringify!(#name)),
                            #entity_name,
                            #schema,
                            #table,
                        )
                        #(.field(#fields))*
                        .alternate_key(&[#(#alternate_key),*])
                    });
                &DESCRIPTOR
            }

            fn write_values(&self, out: &mut Vec<::strata::Value>) {
                #(#writes)*
            }

            fn read_values(values: &mut ::strata::ValueCursor) -> ::strata::Result<Self> {
                Ok(Self {
                    #(#reads),*
                })
            }
        }

        impl #name {
            #(#references)*
        }
    }
}

#[proc_macro_derive(Entity, attributes(strata))]
pub fn derive_entity(input: TokenStream) -> TokenStream {
    let item: ItemStruct = parse_macro_input!(input as ItemStruct);
    let entity = decode_entity(item);
    entity_impl(&entity).into()
}
