/// Built-in document templates. Overrides live only in daemon memory for the
/// session; `templates.reset` drops back to these.
pub const ENROLLMENT_DECLARATION: &str = "enrollment_declaration";
pub const ENROLLMENT_TERM: &str = "enrollment_term";
pub const CONDUCT_TERM: &str = "conduct_term";
pub const REPORT_CARD: &str = "report_card";

pub const TEMPLATE_KEYS: [&str; 4] = [
    ENROLLMENT_DECLARATION,
    ENROLLMENT_TERM,
    CONDUCT_TERM,
    REPORT_CARD,
];

pub fn title(key: &str) -> Option<&'static str> {
    match key {
        ENROLLMENT_DECLARATION => Some("Declaracao de Matricula"),
        ENROLLMENT_TERM => Some("Termo de Matricula"),
        CONDUCT_TERM => Some("Termo de Compromisso"),
        REPORT_CARD => Some("Boletim Escolar"),
        _ => None,
    }
}

pub fn default_body(key: &str) -> Option<&'static str> {
    match key {
        ENROLLMENT_DECLARATION => Some(DEFAULT_ENROLLMENT_DECLARATION),
        ENROLLMENT_TERM => Some(DEFAULT_ENROLLMENT_TERM),
        CONDUCT_TERM => Some(DEFAULT_CONDUCT_TERM),
        REPORT_CARD => Some(DEFAULT_REPORT_CARD),
        _ => None,
    }
}

const DEFAULT_ENROLLMENT_DECLARATION: &str = "\
DECLARAÇÃO DE MATRÍCULA

Declaro para os devidos fins que o(a) aluno(a) [NOME_ALUNO], portador(a) do RG nº \
[RG_ALUNO] e CPF nº [CPF_ALUNO], está devidamente matriculado(a) nesta instituição \
de ensino no [ANO_SERIE] do Ensino [NIVEL_ENSINO], no ano letivo de [ANO_LETIVO], \
turno [TURNO].

[CIDADE], [DATA]

_________________________________
[NOME_DIRETOR]
Diretor(a)";

const DEFAULT_ENROLLMENT_TERM: &str = "\
TERMO DE MATRÍCULA

Pelo presente termo, fica matriculado(a) nesta instituição o(a) aluno(a) \
[NOME_ALUNO], filho(a) de [NOME_PAI] e [NOME_MAE], nascido(a) em [DATA_NASCIMENTO], \
natural de [NATURALIDADE], portador(a) do RG nº [RG_ALUNO] e CPF nº [CPF_ALUNO].

Série/Ano: [ANO_SERIE]
Turma: [TURMA]
Turno: [TURNO]
Ano Letivo: [ANO_LETIVO]

[CIDADE], [DATA]

_________________________________          _________________________________
Responsável pela Matrícula                 Responsável pelo Aluno";

const DEFAULT_CONDUCT_TERM: &str = "\
TERMO DE COMPROMISSO E CONDUTA

O(A) aluno(a) [NOME_ALUNO], matriculado(a) no [ANO_SERIE] da turma [TURMA], e seu \
responsável [NOME_RESPONSAVEL], comprometem-se a:

1. Respeitar as normas da instituição;
2. Zelar pelo patrimônio escolar;
3. Manter assiduidade e pontualidade;
4. Cumprir as atividades pedagógicas;
5. Participar das reuniões quando convocado.

[CIDADE], [DATA]

_________________________________          _________________________________
Aluno(a)                                   Responsável";

const DEFAULT_REPORT_CARD: &str = "\
BOLETIM ESCOLAR

[CIDADE]
Ano Letivo: [ANO]

DADOS DO ALUNO:
Nome: [NOME_ALUNO]
Matrícula: [MATRICULA]
Turma: [TURMA]

RENDIMENTO ESCOLAR:
[NOTAS]

Média Geral: [MEDIA_GERAL]
Situação: [SITUACAO]

_______________________________
Diretor(a)

Data de emissão: [DATA_EMISSAO]";
