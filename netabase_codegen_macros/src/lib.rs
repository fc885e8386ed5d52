use netabase_codegen_annotations::{AnnotationKey, parse_tag};
use proc_macro::TokenStream;
use quote::quote;
use syn::{Data, DeriveInput, Error, Expr, Fields, Lit, Meta, parse_macro_input};

/// Registers the `#[model(..)]` field attribute so annotated structs compile.
///
/// The derive generates nothing. `netabase-codegen` reads the annotations from
/// source and emits the accessor implementations separately. The derive does
/// check annotation syntax so mistakes surface at the annotated field.
///
/// # Examples
///
/// ```
/// use netabase_codegen_macros::Model;
///
/// #[derive(Model, Default, Clone)]
/// pub struct User {
///     #[model("pk")]
///     pub user_id: u64,
///     #[model("name=display_name")]
///     pub name: String,
///     #[model = "-"]
///     pub cache: Vec<u8>,
///     #[model("name=first\\,last")]
///     pub label: String,
/// }
/// ```
///
/// Unknown keys are rejected:
///
/// ```compile_fail
/// use netabase_codegen_macros::Model;
///
/// #[derive(Model)]
/// pub struct User {
///     #[model("index")]
///     pub id: u64,
/// }
/// ```
#[proc_macro_derive(Model, attributes(model))]
pub fn model_derive(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    match check_annotations(&input) {
        Ok(()) => quote!().into(),
        Err(e) => e.to_compile_error().into(),
    }
}

fn check_annotations(input: &DeriveInput) -> syn::Result<()> {
    let Data::Struct(data) = &input.data else {
        return Err(Error::new_spanned(
            &input.ident,
            "Model can only be derived for structs",
        ));
    };
    let Fields::Named(fields) = &data.fields else {
        return Ok(());
    };

    let mut primary = None;
    for field in &fields.named {
        for attr in field.attrs.iter().filter(|a| a.path().is_ident("model")) {
            let tag = tag_of(&attr.meta)?;
            for option in parse_tag(&tag.value()) {
                let Some(key) = option.known() else {
                    return Err(Error::new_spanned(
                        &tag,
                        format!("unknown model annotation `{}`", option.key),
                    ));
                };
                if key == AnnotationKey::Primary {
                    if let Some(previous) = primary.replace(field.ident.clone()) {
                        return Err(Error::new_spanned(
                            &tag,
                            format!(
                                "`{}` is already the primary field",
                                previous.map(|i| i.to_string()).unwrap_or_default()
                            ),
                        ));
                    }
                }
            }
        }
    }
    Ok(())
}

fn tag_of(meta: &Meta) -> syn::Result<syn::LitStr> {
    match meta {
        Meta::List(list) => list.parse_args::<syn::LitStr>(),
        Meta::NameValue(nv) => match &nv.value {
            Expr::Lit(expr) => match &expr.lit {
                Lit::Str(s) => Ok(s.clone()),
                other => Err(Error::new_spanned(other, "expected a string literal")),
            },
            other => Err(Error::new_spanned(other, "expected a string literal")),
        },
        Meta::Path(path) => Err(Error::new_spanned(
            path,
            "expected #[model(\"..\")] or #[model = \"..\"]",
        )),
    }
}
