/// Defines a config struct whose doc comments can be written into a [`toml_edit`] document.
///
/// Fields marked `#[child = true]` must be config structs themselves, their keys are
/// documented recursively. Attributes meant for the field rather than the docs are written
/// with a double `# #`, e.g. `# #[serde(with = "...")]`.
///
/// The struct must implement [`Default`] and `serde`, and none of the fields can be [`Option`].
macro_rules! config_struct {
    (
        $(#[$meta:meta])*
        pub struct $name:ident {
            $(
                $(#[child = $child:literal])?
                $(#[doc = $doc:expr])*
                $(# #[$field_meta:meta])*
                pub $field:ident: $field_ty:ty,
            )*
        }
    ) => {
        $(#[$meta])*
        pub struct $name {
            $(
                $(#[doc = $doc])*
                $(#[$field_meta])*
                pub $field: $field_ty,
            )*
        }

        impl $name {
            /// Prefixes every key in `table` with the doc comment of its field.
            pub fn write_docs(table: &mut dyn ::toml_edit::TableLike) {
                $(
                    let key = stringify!($field);
                    let comment = [$(format!("##{}\n", $doc),)*].concat();

                    $(
                        if $child {
                            if let Some(child) = table
                                .get_mut(key)
                                .and_then(::toml_edit::Item::as_table_like_mut)
                            {
                                <$field_ty>::write_docs(child);
                            }
                        }
                    )?

                    if let Some(child) = table
                        .get_mut(key)
                        .and_then(::toml_edit::Item::as_table_mut)
                    {
                        child.decor_mut().set_prefix(format!("\n{comment}"));
                    } else if let Some(mut key) = table.key_mut(key) {
                        key.leaf_decor_mut().set_prefix(comment);
                    }
                )*
            }
        }
    };
}

pub(crate) use config_struct;
