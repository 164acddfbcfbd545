fn main() {
    tonic_build::configure()
        .out_dir("./src")
        .compile(&["proto/node_agent.proto"], &["proto"])
        .expect("failed to compile protos");
}
