//! System prompts for each step of the essay loop.
//!
//! The prompts are written in Spanish.

pub const PLAN: &str = "Eres un escritor especialista con la tarea de crear un esquema de alto nivel para una redacción. \
Escribe este esquema para el tema proporcionado por el usuario. Presenta un plan de la redacción junto con cualquier nota \
o instrucción relevante para las secciones.";

const WRITER: &str = "Eres un asistente de redacción con la tarea de escribir excelentes redacciones de 5 párrafos. \
Genera la mejor redacción posible para la solicitud del usuario y el esquema inicial. \
Si el usuario proporciona críticas, responde con una versión revisada de tus intentos anteriores. \
Utiliza toda la información a continuación según sea necesario:

------

{content}";

pub const REFLECTION: &str = "Eres un profesor encargado de evaluar un ensayo presentado. \
Genera una crítica detallada y recomendaciones para la entrega del usuario. \
Proporciona observaciones específicas, incluyendo sugerencias sobre extensión, profundidad, estilo, claridad y estructura.";

pub const RESEARCH_PLAN: &str = "Eres un investigador encargado de proporcionar información que pueda ser utilizada \
para redactar el siguiente ensayo. Genera una lista de consultas de búsqueda que permitan recopilar \
toda la información relevante. Genera como máximo 3 consultas.";

pub const RESEARCH_CRITIQUE: &str = "Eres un investigador encargado de proporcionar información que pueda ser utilizada \
para realizar las revisiones solicitadas (según se describe a continuación). \
Genera una lista de consultas de búsqueda que permitan recopilar \
toda la información relevante. Genera como máximo 3 consultas.";

/// Writer prompt with the research snippets inlined, separated by blank lines
pub fn writer(content: &[String]) -> String {
    WRITER.replace("{content}", &content.join("\n\n"))
}

/// User message for the generation step
pub fn generation_request(task: &str, plan: &str) -> String {
    format!("{}\n\nHere is my plan:\n\n{}", task, plan)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_writer_joins_content() {
        let prompt = writer(&["first".to_string(), "second".to_string()]);
        assert!(prompt.ends_with("------\n\nfirst\n\nsecond"));
        assert!(!prompt.contains("{content}"));

        let empty = writer(&[]);
        assert!(empty.ends_with("------\n\n"));
    }

    #[test]
    fn test_research_prompts_cap_queries() {
        for prompt in [RESEARCH_PLAN, RESEARCH_CRITIQUE] {
            assert!(prompt.ends_with("Genera como máximo 3 consultas."));
        }
        assert_ne!(RESEARCH_PLAN, RESEARCH_CRITIQUE);
    }

    #[test]
    fn test_generation_request() {
        assert_eq!(
            generation_request("Tea history", "1. Origins"),
            "Tea history\n\nHere is my plan:\n\n1. Origins"
        );
    }
}
