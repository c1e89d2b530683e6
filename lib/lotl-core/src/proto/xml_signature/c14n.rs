//! Canonical XML 1.0 and Exclusive Canonical XML 1.0, without comments.

use std::collections::{BTreeMap, BTreeSet};

use roxmltree::{Node, NodeId, NodeType};

pub(crate) const XML_NAMESPACE: &str = "http://www.w3.org/XML/1998/namespace";

#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) enum Canonicalization {
    Inclusive,
    Exclusive { inclusive_prefixes: Vec<String> },
}

/// Prefix (`""` for the default namespace) to namespace URI.
type NamespaceMap = BTreeMap<String, String>;

/// Canonicalizes the subtree rooted at `node`, leaving out the subtree `excluded`.
///
/// The document node canonicalizes the whole document.
pub(crate) fn canonicalize(
    node: Node<'_, '_>,
    method: &Canonicalization,
    excluded: Option<NodeId>,
) -> String {
    let canonicalizer = Canonicalizer { method, excluded };
    let mut output = String::new();

    if node.is_root() {
        canonicalizer.write_document(node, &mut output);
    } else if node.is_element() {
        canonicalizer.write_element(node, &NamespaceMap::new(), true, &mut output);
    }

    output
}

struct Canonicalizer<'m> {
    method: &'m Canonicalization,
    excluded: Option<NodeId>,
}

impl Canonicalizer<'_> {
    fn write_document(&self, document: Node<'_, '_>, output: &mut String) {
        let mut after_document_element = false;
        for child in document.children() {
            if self.is_excluded(child) {
                continue;
            }
            match child.node_type() {
                NodeType::Element => {
                    self.write_element(child, &NamespaceMap::new(), true, output);
                    after_document_element = true;
                }
                NodeType::PI => {
                    if after_document_element {
                        output.push('\n');
                    }
                    write_processing_instruction(child, output);
                    if !after_document_element {
                        output.push('\n');
                    }
                }
                _ => {}
            }
        }
    }

    fn write_element(
        &self,
        node: Node<'_, '_>,
        rendered: &NamespaceMap,
        is_apex: bool,
        output: &mut String,
    ) {
        let in_scope = in_scope_namespaces(node);
        let name = qualified_name(node);
        let declarations = match self.method {
            Canonicalization::Inclusive => inclusive_declarations(&in_scope, rendered),
            Canonicalization::Exclusive { inclusive_prefixes } => exclusive_declarations(
                node,
                &name,
                &in_scope,
                rendered,
                inclusive_prefixes,
            ),
        };

        output.push('<');
        output.push_str(&name);
        for (prefix, uri) in &declarations {
            if prefix.is_empty() {
                output.push_str(" xmlns=\"");
            } else {
                output.push_str(" xmlns:");
                output.push_str(prefix);
                output.push_str("=\"");
            }
            escape_attribute(uri, output);
            output.push('"');
        }

        let inherit_xml_attributes =
            is_apex && matches!(self.method, Canonicalization::Inclusive);
        for attribute in sorted_attributes(node, inherit_xml_attributes) {
            output.push(' ');
            output.push_str(&attribute.name);
            output.push_str("=\"");
            escape_attribute(&attribute.value, output);
            output.push('"');
        }
        output.push('>');

        let mut child_rendered = rendered.clone();
        child_rendered.extend(declarations);

        for child in node.children() {
            if self.is_excluded(child) {
                continue;
            }
            match child.node_type() {
                NodeType::Element => self.write_element(child, &child_rendered, false, output),
                NodeType::Text => escape_text(child.text().unwrap_or_default(), output),
                NodeType::PI => write_processing_instruction(child, output),
                _ => {}
            }
        }

        output.push_str("</");
        output.push_str(&name);
        output.push('>');
    }

    fn is_excluded(&self, node: Node<'_, '_>) -> bool {
        self.excluded == Some(node.id())
    }
}

fn in_scope_namespaces(node: Node<'_, '_>) -> NamespaceMap {
    node.namespaces()
        .filter(|namespace| namespace.name() != Some("xml") && !namespace.uri().is_empty())
        .map(|namespace| {
            (
                namespace.name().unwrap_or_default().to_owned(),
                namespace.uri().to_owned(),
            )
        })
        .collect()
}

fn inclusive_declarations(in_scope: &NamespaceMap, rendered: &NamespaceMap) -> NamespaceMap {
    let mut declarations: NamespaceMap = in_scope
        .iter()
        .filter(|(prefix, uri)| rendered.get(*prefix) != Some(*uri))
        .map(|(prefix, uri)| (prefix.clone(), uri.clone()))
        .collect();

    if !in_scope.contains_key("") && has_default_namespace(rendered) {
        declarations.insert(String::new(), String::new());
    }

    declarations
}

fn exclusive_declarations(
    node: Node<'_, '_>,
    name: &str,
    in_scope: &NamespaceMap,
    rendered: &NamespaceMap,
    inclusive_prefixes: &[String],
) -> NamespaceMap {
    let mut utilized = BTreeSet::new();
    utilized.insert(
        name.split_once(':')
            .map(|(prefix, _)| prefix)
            .unwrap_or_default()
            .to_owned(),
    );
    for attribute in node.attributes() {
        if let Some(prefix) = attribute
            .namespace()
            .filter(|namespace| *namespace != XML_NAMESPACE)
            .and_then(|namespace| attribute_prefix(node, namespace))
        {
            utilized.insert(prefix);
        }
    }
    for prefix in inclusive_prefixes {
        let prefix = if prefix == "#default" { "" } else { prefix };
        if in_scope.contains_key(prefix) {
            utilized.insert(prefix.to_owned());
        }
    }

    let mut declarations = NamespaceMap::new();
    for prefix in utilized {
        match in_scope.get(&prefix) {
            Some(uri) if rendered.get(&prefix) != Some(uri) => {
                declarations.insert(prefix, uri.clone());
            }
            Some(_) => {}
            None if prefix.is_empty() && has_default_namespace(rendered) => {
                declarations.insert(String::new(), String::new());
            }
            None => {}
        }
    }
    declarations
}

fn has_default_namespace(rendered: &NamespaceMap) -> bool {
    rendered.get("").is_some_and(|uri| !uri.is_empty())
}

/// Element name as written in the source, with its prefix.
fn qualified_name(node: Node<'_, '_>) -> String {
    let source = node.document().input_text();
    source
        .get(node.range())
        .and_then(|raw| raw.strip_prefix('<'))
        .and_then(|raw| {
            raw.split(|c: char| c.is_whitespace() || c == '>' || c == '/')
                .next()
        })
        .filter(|name| !name.is_empty())
        .unwrap_or(node.tag_name().name())
        .to_owned()
}

fn attribute_prefix(node: Node<'_, '_>, namespace: &str) -> Option<String> {
    node.namespaces()
        .find(|candidate| candidate.uri() == namespace && candidate.name().is_some())
        .and_then(|candidate| candidate.name())
        .map(ToOwned::to_owned)
}

struct CanonicalAttribute {
    namespace: String,
    local_name: String,
    name: String,
    value: String,
}

fn sorted_attributes(node: Node<'_, '_>, inherit_xml_attributes: bool) -> Vec<CanonicalAttribute> {
    let mut attributes: Vec<CanonicalAttribute> = node
        .attributes()
        .map(|attribute| {
            let local_name = attribute.name().to_owned();
            let (namespace, name) = match attribute.namespace() {
                None => (String::new(), local_name.clone()),
                Some(XML_NAMESPACE) => (XML_NAMESPACE.to_owned(), format!("xml:{local_name}")),
                Some(namespace) => {
                    let name = match attribute_prefix(node, namespace) {
                        Some(prefix) => format!("{prefix}:{local_name}"),
                        None => local_name.clone(),
                    };
                    (namespace.to_owned(), name)
                }
            };
            CanonicalAttribute {
                namespace,
                local_name,
                name,
                value: attribute.value().to_owned(),
            }
        })
        .collect();

    if inherit_xml_attributes {
        for ancestor in node.ancestors().skip(1) {
            for attribute in ancestor
                .attributes()
                .filter(|attribute| attribute.namespace() == Some(XML_NAMESPACE))
            {
                let present = attributes.iter().any(|existing| {
                    existing.namespace == XML_NAMESPACE && existing.local_name == attribute.name()
                });
                if !present {
                    attributes.push(CanonicalAttribute {
                        namespace: XML_NAMESPACE.to_owned(),
                        local_name: attribute.name().to_owned(),
                        name: format!("xml:{}", attribute.name()),
                        value: attribute.value().to_owned(),
                    });
                }
            }
        }
    }

    attributes.sort_by(|a, b| {
        (a.namespace.as_str(), a.local_name.as_str())
            .cmp(&(b.namespace.as_str(), b.local_name.as_str()))
    });
    attributes
}

fn write_processing_instruction(node: Node<'_, '_>, output: &mut String) {
    if let Some(pi) = node.pi() {
        output.push_str("<?");
        output.push_str(pi.target);
        if let Some(value) = pi.value.filter(|value| !value.is_empty()) {
            output.push(' ');
            output.push_str(value);
        }
        output.push_str("?>");
    }
}

fn escape_text(text: &str, output: &mut String) {
    for c in text.chars() {
        match c {
            '&' => output.push_str("&amp;"),
            '<' => output.push_str("&lt;"),
            '>' => output.push_str("&gt;"),
            '\r' => output.push_str("&#xD;"),
            _ => output.push(c),
        }
    }
}

fn escape_attribute(value: &str, output: &mut String) {
    for c in value.chars() {
        match c {
            '&' => output.push_str("&amp;"),
            '<' => output.push_str("&lt;"),
            '"' => output.push_str("&quot;"),
            '\t' => output.push_str("&#x9;"),
            '\n' => output.push_str("&#xA;"),
            '\r' => output.push_str("&#xD;"),
            _ => output.push(c),
        }
    }
}
